//! Per-lead orchestration: filter → R-peaks → RR → HRV → segment labels.
//!
//! Parameter problems fail the whole request before any lead is touched.
//! Numerical problems confined to one lead (too short, too few beats,
//! non-finite samples) become a failure marker on that lead and the
//! remaining leads are still processed.

use crate::{
    classify::{classify_segments, summarize, ClassificationSummary, ClassifierConfig},
    detectors::ecg::{detect_r_peaks, DetectorConfig},
    error::{EcgError, LeadFailure},
    filter::{BandPass, FilterConfig},
    metrics::hrv::{hrv_metrics, HrvConfig, HrvMetrics},
    model::SharedModel,
    signal::{check_fs, Events, Lead, RRSeries, Recording, TimeSeries},
};
use indexmap::IndexMap;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, panic, thread};

/// Every tunable of the analysis, loadable from a partial TOML/JSON document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub filter: FilterConfig,
    pub detector: DetectorConfig,
    pub hrv: HrvConfig,
    pub classifier: ClassifierConfig,
}

impl AnalysisConfig {
    pub fn validate(&self, fs: f64) -> Result<(), EcgError> {
        check_fs(fs)?;
        self.filter.validate(fs)?;
        self.detector.validate()?;
        self.hrv.validate()?;
        self.classifier.validate(fs)
    }
}

/// HRV outcome for one lead: metrics, or the reason they are missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HrvOutcome {
    Metrics(HrvMetrics),
    Failed(LeadFailure),
}

impl HrvOutcome {
    pub fn metrics(&self) -> Option<&HrvMetrics> {
        match self {
            HrvOutcome::Metrics(m) => Some(m),
            HrvOutcome::Failed(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadResult {
    pub lead: String,
    pub peaks: Events,
    pub hrv: HrvOutcome,
    pub classification: ClassificationSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LeadReport {
    Complete(LeadResult),
    Failed { lead: String, failure: LeadFailure },
}

impl LeadReport {
    pub fn lead(&self) -> &str {
        match self {
            LeadReport::Complete(result) => &result.lead,
            LeadReport::Failed { lead, .. } => lead,
        }
    }

    pub fn result(&self) -> Option<&LeadResult> {
        match self {
            LeadReport::Complete(result) => Some(result),
            LeadReport::Failed { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<&LeadFailure> {
        match self {
            LeadReport::Complete(result) => match &result.hrv {
                HrvOutcome::Failed(f) => Some(f),
                HrvOutcome::Metrics(_) => None,
            },
            LeadReport::Failed { failure, .. } => Some(failure),
        }
    }
}

/// Outcome of one analysis request, keyed by lead name in input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub fs: f64,
    pub sample_count: usize,
    pub leads: IndexMap<String, LeadReport>,
}

impl AnalysisResult {
    pub fn get(&self, lead: &str) -> Option<&LeadReport> {
        self.leads.get(lead)
    }

    pub fn completed(&self) -> impl Iterator<Item = &LeadResult> {
        self.leads.values().filter_map(LeadReport::result)
    }
}

/// Analysis entry point holding the shared, read-only inference model.
#[derive(Clone)]
pub struct Analyzer {
    model: SharedModel,
    config: AnalysisConfig,
}

impl Analyzer {
    pub fn new(model: SharedModel, config: AnalysisConfig) -> Result<Self, EcgError> {
        if model.input_len() != config.classifier.target_len {
            return Err(EcgError::invalid(format!(
                "model expects {} samples per window but target_len is {}",
                model.input_len(),
                config.classifier.target_len
            )));
        }
        Ok(Self { model, config })
    }

    /// Analyse every lead sequentially.
    pub fn analyze(&self, recording: &Recording) -> Result<AnalysisResult, EcgError> {
        let design = self.prepare(recording)?;
        let leads = recording
            .leads
            .iter()
            .map(|lead| self.analyze_lead(&design, recording.fs, lead))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.finish(recording, leads))
    }

    /// Analyse leads on scoped worker threads; output order matches input order.
    pub fn analyze_parallel(&self, recording: &Recording) -> Result<AnalysisResult, EcgError> {
        let design = self.prepare(recording)?;
        let leads = thread::scope(|scope| {
            let handles: Vec<_> = recording
                .leads
                .iter()
                .map(|lead| {
                    let design = &design;
                    scope.spawn(move || self.analyze_lead(design, recording.fs, lead))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|payload| panic::resume_unwind(payload)))
                .collect::<Result<Vec<_>, _>>()
        })?;
        Ok(self.finish(recording, leads))
    }

    fn prepare(&self, recording: &Recording) -> Result<BandPass, EcgError> {
        self.config.validate(recording.fs)?;
        if recording.leads.is_empty() {
            return Err(EcgError::invalid("recording has no leads"));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = recording.leads.iter().find(|l| !seen.insert(l.name.as_str())) {
            return Err(EcgError::invalid(format!("duplicate lead name {:?}", dup.name)));
        }
        BandPass::butterworth(&self.config.filter, recording.fs)
    }

    fn finish(&self, recording: &Recording, leads: Vec<LeadReport>) -> AnalysisResult {
        let failed = leads.iter().filter(|r| r.failure().is_some()).count();
        info!(
            "analysed {} leads at {} Hz ({} with failures)",
            leads.len(),
            recording.fs,
            failed
        );
        AnalysisResult {
            fs: recording.fs,
            sample_count: recording.sample_count(),
            leads: leads
                .into_iter()
                .map(|r| (r.lead().to_string(), r))
                .collect(),
        }
    }

    fn analyze_lead(
        &self,
        design: &BandPass,
        fs: f64,
        lead: &Lead,
    ) -> Result<LeadReport, EcgError> {
        let non_finite = lead.data.iter().filter(|v| !v.is_finite()).count();
        if non_finite > 0 {
            return Ok(failed_lead(lead, LeadFailure::corrupt_samples(non_finite)));
        }

        let filtered = match design.filtfilt(&lead.data) {
            Ok(data) => TimeSeries::new(fs, data),
            Err(err) => return absorb(lead, err),
        };
        let peaks = detect_r_peaks(&filtered, &self.config.detector)?;
        let rr = RRSeries::from_events(&peaks, fs);
        let hrv = match hrv_metrics(&rr, &self.config.hrv) {
            Ok(metrics) => HrvOutcome::Metrics(metrics),
            Err(err) => match LeadFailure::from_error(&err) {
                Some(failure) => {
                    warn!("{}: HRV omitted: {}", lead.name, failure.message);
                    HrvOutcome::Failed(failure)
                }
                None => return Err(err),
            },
        };
        let labels = classify_segments(self.model.as_ref(), &filtered, &self.config.classifier)?;
        debug!(
            "{}: {} peaks, {} windows",
            lead.name,
            peaks.len(),
            labels.len()
        );
        Ok(LeadReport::Complete(LeadResult {
            lead: lead.name.clone(),
            peaks,
            hrv,
            classification: summarize(&labels),
        }))
    }
}

fn failed_lead(lead: &Lead, failure: LeadFailure) -> LeadReport {
    warn!("{}: lead skipped: {}", lead.name, failure.message);
    LeadReport::Failed {
        lead: lead.name.clone(),
        failure,
    }
}

fn absorb(lead: &Lead, err: EcgError) -> Result<LeadReport, EcgError> {
    match LeadFailure::from_error(&err) {
        Some(failure) => Ok(failed_lead(lead, failure)),
        None => Err(err),
    }
}

/// One-shot convenience over [`Analyzer`].
pub fn analyze(
    recording: &Recording,
    model: SharedModel,
    config: AnalysisConfig,
) -> Result<AnalysisResult, EcgError> {
    Analyzer::new(model, config)?.analyze(recording)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        classify::SegmentLabel,
        error::FailureKind,
        fixtures::regular_rhythm,
        model::{InferenceModel, LinearSoftmaxModel},
    };
    use std::sync::Arc;

    const TARGET: usize = 64;

    fn config() -> AnalysisConfig {
        AnalysisConfig {
            classifier: ClassifierConfig {
                target_len: TARGET,
                ..ClassifierConfig::default()
            },
            ..AnalysisConfig::default()
        }
    }

    fn analyzer() -> Analyzer {
        let model: SharedModel = Arc::new(LinearSoftmaxModel::constant(TARGET, 5, 0).unwrap());
        Analyzer::new(model, config()).unwrap()
    }

    fn healthy(fs: f64) -> Vec<f64> {
        regular_rhythm(fs, 0.8, 12.0).0.data
    }

    #[test]
    fn healthy_lead_gets_full_result() {
        let fs = 250.0;
        let recording = Recording::new(fs).with_lead("lead1", healthy(fs));
        let result = analyzer().analyze(&recording).unwrap();
        let lead = result.get("lead1").and_then(LeadReport::result).unwrap();
        assert!(lead.peaks.len() >= 12);
        let hrv = lead.hrv.metrics().expect("hrv metrics");
        assert!(hrv.sdrr < 5.0, "regular rhythm sdrr {}", hrv.sdrr);
        assert_eq!(hrv.prr, 0.0);
        let windows = recording.leads[0].data.len() / (5.0 * fs) as usize;
        assert_eq!(lead.classification.get(&SegmentLabel::Normal), Some(&windows));
    }

    #[test]
    fn corrupt_lead_does_not_abort_healthy_one() {
        let fs = 250.0;
        let recording = Recording::new(fs)
            .with_lead("lead1", vec![0.2; 10])
            .with_lead("lead2", healthy(fs));
        let result = analyzer().analyze(&recording).unwrap();
        assert_eq!(result.leads.len(), 2);
        let corrupt = result.get("lead1").unwrap();
        assert_eq!(
            corrupt.failure().map(|f| f.kind),
            Some(FailureKind::InsufficientData)
        );
        assert!(corrupt.result().is_none());
        let ok = result.get("lead2").and_then(LeadReport::result).unwrap();
        assert!(ok.hrv.metrics().is_some());
    }

    #[test]
    fn non_finite_samples_are_reported_per_lead() {
        let fs = 250.0;
        let mut bad = healthy(fs);
        bad[40] = f64::NAN;
        let recording = Recording::new(fs)
            .with_lead("lead1", bad)
            .with_lead("lead2", healthy(fs));
        let result = analyzer().analyze(&recording).unwrap();
        assert_eq!(
            result.get("lead1").and_then(LeadReport::failure).map(|f| f.kind),
            Some(FailureKind::CorruptSamples)
        );
        assert!(result.get("lead2").and_then(LeadReport::result).is_some());
    }

    #[test]
    fn flat_lead_keeps_classification_without_hrv() {
        let fs = 250.0;
        let recording = Recording::new(fs).with_lead("lead1", vec![0.0; 2600]);
        let result = analyzer().analyze(&recording).unwrap();
        let lead = result.get("lead1").and_then(LeadReport::result).unwrap();
        assert!(lead.peaks.is_empty());
        assert!(matches!(
            &lead.hrv,
            HrvOutcome::Failed(f) if f.kind == FailureKind::InsufficientBeats
        ));
        assert_eq!(lead.classification.values().sum::<usize>(), 2);
    }

    #[test]
    fn invalid_parameters_fail_the_request() {
        let recording = Recording::new(0.0).with_lead("lead1", vec![0.0; 100]);
        assert!(matches!(
            analyzer().analyze(&recording),
            Err(EcgError::InvalidParameter(_))
        ));
        // 45 Hz highcut is above Nyquist at 80 Hz
        let recording = Recording::new(80.0).with_lead("lead1", vec![0.0; 1000]);
        assert!(matches!(
            analyzer().analyze(&recording),
            Err(EcgError::InvalidParameter(_))
        ));
        assert!(matches!(
            analyzer().analyze(&Recording::new(250.0)),
            Err(EcgError::InvalidParameter(_))
        ));
    }

    #[test]
    fn model_input_length_must_match_config() {
        let model: SharedModel = Arc::new(LinearSoftmaxModel::constant(32, 5, 0).unwrap());
        assert!(Analyzer::new(model, config()).is_err());
    }

    struct FailingModel;

    impl InferenceModel for FailingModel {
        fn input_len(&self) -> usize {
            TARGET
        }
        fn predict(&self, _input: &[f64]) -> Result<Vec<f64>, EcgError> {
            Err(EcgError::ModelUnavailable("session closed".into()))
        }
    }

    #[test]
    fn unavailable_model_is_fatal() {
        let fs = 250.0;
        let recording = Recording::new(fs).with_lead("lead1", healthy(fs));
        let analyzer = Analyzer::new(Arc::new(FailingModel), config()).unwrap();
        assert!(matches!(
            analyzer.analyze(&recording),
            Err(EcgError::ModelUnavailable(_))
        ));
    }

    #[test]
    fn repeated_analysis_is_identical() {
        let fs = 360.0;
        let recording = Recording::from_channels(fs, vec![healthy(fs), healthy(fs)]);
        let analyzer = analyzer();
        let first = analyzer.analyze(&recording).unwrap();
        let second = analyzer.analyze(&recording).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn parallel_matches_sequential() {
        let fs = 250.0;
        let recording = Recording::from_channels(
            fs,
            vec![healthy(fs), vec![0.0; 5], healthy(fs), vec![0.0; 2600]],
        );
        let analyzer = analyzer();
        assert_eq!(
            analyzer.analyze(&recording).unwrap(),
            analyzer.analyze_parallel(&recording).unwrap()
        );
    }

    #[test]
    fn result_serialises_to_plain_mapping() {
        let fs = 250.0;
        let recording = Recording::new(fs)
            .with_lead("lead1", healthy(fs))
            .with_lead("lead2", vec![1.0; 3]);
        let result = analyzer().analyze(&recording).unwrap();
        let value = serde_json::to_value(&result).unwrap();
        let leads = &value["leads"];
        assert_eq!(leads["lead1"]["status"], "complete");
        assert!(leads["lead1"]["hrv"]["metrics"]["RMSSD"].is_number());
        assert_eq!(leads["lead1"]["classification"]["Normal"], 2);
        assert_eq!(leads["lead2"]["status"], "failed");
        assert_eq!(leads["lead2"]["failure"]["kind"], "insufficient_data");
    }

    #[test]
    fn leads_are_keyed_by_name_in_input_order() {
        let fs = 250.0;
        let recording = Recording::new(fs)
            .with_lead("V1", vec![1.0; 3])
            .with_lead("II", healthy(fs))
            .with_lead("aVR", vec![0.0; 2600]);
        let result = analyzer().analyze_parallel(&recording).unwrap();
        let names: Vec<_> = result.leads.keys().map(String::as_str).collect();
        assert_eq!(names, ["V1", "II", "aVR"]);
        assert!(result.leads.iter().all(|(name, report)| name == report.lead()));

        let text = serde_json::to_string(&result).unwrap();
        let (v1, ii, avr) = (
            text.find("\"V1\":").unwrap(),
            text.find("\"II\":").unwrap(),
            text.find("\"aVR\":").unwrap(),
        );
        assert!(v1 < ii && ii < avr, "{text}");
        let back: AnalysisResult = serde_json::from_str(&text).unwrap();
        assert!(back.leads.keys().eq(result.leads.keys()));
    }

    #[test]
    fn duplicate_lead_names_are_rejected() {
        let fs = 250.0;
        let recording = Recording::new(fs)
            .with_lead("II", healthy(fs))
            .with_lead("V1", healthy(fs))
            .with_lead("II", healthy(fs));
        let analyzer = analyzer();
        for outcome in [analyzer.analyze(&recording), analyzer.analyze_parallel(&recording)] {
            match outcome {
                Err(EcgError::InvalidParameter(msg)) => assert!(msg.contains("II"), "{msg}"),
                other => panic!("expected duplicate-name rejection, got {other:?}"),
            }
        }
    }

    struct PanickingModel;

    impl InferenceModel for PanickingModel {
        fn input_len(&self) -> usize {
            TARGET
        }
        fn predict(&self, _input: &[f64]) -> Result<Vec<f64>, EcgError> {
            panic!("model crashed")
        }
    }

    #[test]
    fn worker_panic_propagates_to_caller() {
        let fs = 250.0;
        let recording = Recording::new(fs)
            .with_lead("lead1", healthy(fs))
            .with_lead("lead2", healthy(fs));
        let analyzer = Analyzer::new(Arc::new(PanickingModel), config()).unwrap();
        let payload = panic::catch_unwind(panic::AssertUnwindSafe(|| {
            analyzer.analyze_parallel(&recording)
        }))
        .expect_err("panic should reach the caller");
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"model crashed"));
    }

    #[test]
    fn analyzer_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Analyzer>();
    }
}
