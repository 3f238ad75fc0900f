//! Fixed-window arrhythmia classification of a filtered lead.

use crate::{
    error::EcgError,
    model::InferenceModel,
    signal::{check_fs, mean, std_dev, TimeSeries},
};
use log::debug;
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// Closed set of rhythm classes a window can receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SegmentLabel {
    Normal,
    #[serde(rename = "PVC")]
    Pvc,
    #[serde(rename = "AFib")]
    AFib,
    #[serde(rename = "LBBB")]
    Lbbb,
    #[serde(rename = "RBBB")]
    Rbbb,
}

impl SegmentLabel {
    pub const ALL: [SegmentLabel; 5] = [
        SegmentLabel::Normal,
        SegmentLabel::Pvc,
        SegmentLabel::AFib,
        SegmentLabel::Lbbb,
        SegmentLabel::Rbbb,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentLabel::Normal => "Normal",
            SegmentLabel::Pvc => "PVC",
            SegmentLabel::AFib => "AFib",
            SegmentLabel::Lbbb => "LBBB",
            SegmentLabel::Rbbb => "RBBB",
        }
    }
}

impl fmt::Display for SegmentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label counts for one lead; only labels that occurred are present.
pub type ClassificationSummary = BTreeMap<SegmentLabel, usize>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Label for each model output index, in order.
    pub labels: Vec<SegmentLabel>,
    /// Window duration (seconds).
    pub window_seconds: f64,
    /// Samples per window after resampling; must equal the model input length.
    pub target_len: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            labels: SegmentLabel::ALL.to_vec(),
            window_seconds: 5.0,
            target_len: 1800,
        }
    }
}

impl ClassifierConfig {
    pub fn validate(&self, fs: f64) -> Result<(), EcgError> {
        check_fs(fs)?;
        if self.labels.is_empty() {
            return Err(EcgError::invalid("classifier label set is empty"));
        }
        for (i, label) in self.labels.iter().enumerate() {
            if self.labels[..i].contains(label) {
                return Err(EcgError::invalid(format!("label {label} listed twice")));
            }
        }
        if !(self.window_seconds.is_finite() && self.window_seconds > 0.0) {
            return Err(EcgError::invalid(format!(
                "window must be positive, got {} s",
                self.window_seconds
            )));
        }
        if self.window_len(fs) == 0 {
            return Err(EcgError::invalid(format!(
                "{} s at {fs} Hz is shorter than one sample",
                self.window_seconds
            )));
        }
        if self.target_len == 0 {
            return Err(EcgError::invalid("target resample length must be positive"));
        }
        Ok(())
    }

    pub fn window_len(&self, fs: f64) -> usize {
        (self.window_seconds * fs) as usize
    }
}

/// Label every complete window of `ts`; a trailing partial window is dropped.
pub fn classify_segments(
    model: &dyn InferenceModel,
    ts: &TimeSeries,
    cfg: &ClassifierConfig,
) -> Result<Vec<SegmentLabel>, EcgError> {
    cfg.validate(ts.fs)?;
    let window = cfg.window_len(ts.fs);
    let labels = ts
        .data
        .chunks_exact(window)
        .map(|segment| {
            let input = preprocess_segment(segment, cfg.target_len)?;
            let probs = model.predict(&input)?;
            if probs.len() != cfg.labels.len() {
                return Err(EcgError::ModelUnavailable(format!(
                    "model returned {} probabilities for {} labels",
                    probs.len(),
                    cfg.labels.len()
                )));
            }
            Ok(cfg.labels[argmax(&probs)])
        })
        .collect::<Result<Vec<_>, _>>()?;
    debug!(
        "classified {} windows of {} samples",
        labels.len(),
        window
    );
    Ok(labels)
}

pub fn summarize(labels: &[SegmentLabel]) -> ClassificationSummary {
    let mut counts = ClassificationSummary::new();
    for &label in labels {
        *counts.entry(label).or_insert(0) += 1;
    }
    counts
}

/// Zero-mean, unit-variance copy of the segment, resampled to `target_len`.
pub fn preprocess_segment(segment: &[f64], target_len: usize) -> Result<Vec<f64>, EcgError> {
    resample(&normalize(segment), target_len)
}

/// A constant segment normalises to zeros.
pub fn normalize(segment: &[f64]) -> Vec<f64> {
    let m = mean(segment);
    let sd = std_dev(segment);
    if !(sd.is_finite() && sd > 0.0) {
        return vec![0.0; segment.len()];
    }
    segment.iter().map(|x| (x - m) / sd).collect()
}

/// Fourier-domain resampling to `num` samples (band-limited, periodic assumption).
pub fn resample(signal: &[f64], num: usize) -> Result<Vec<f64>, EcgError> {
    let nx = signal.len();
    if num == 0 {
        return Err(EcgError::invalid("resample length must be positive"));
    }
    if nx == 0 {
        return Ok(vec![0.0; num]);
    }
    if nx == num {
        return Ok(signal.to_vec());
    }
    let spectral = |e: realfft::FftError| EcgError::Spectral(e.to_string());

    let mut planner = RealFftPlanner::<f64>::new();
    let r2c = planner.plan_fft_forward(nx);
    let c2r = planner.plan_fft_inverse(num);

    let mut input = signal.to_vec();
    let mut spectrum = r2c.make_output_vec();
    r2c.process(&mut input, &mut spectrum).map_err(spectral)?;

    let mut target = c2r.make_input_vec();
    let n = num.min(nx);
    let keep = n / 2 + 1;
    target[..keep].copy_from_slice(&spectrum[..keep]);
    if n % 2 == 0 {
        // the shared edge bin is folded when shrinking, split when growing
        if num < nx {
            target[n / 2] *= 2.0;
        } else {
            target[n / 2] *= 0.5;
        }
    }
    target[0].im = 0.0;
    if num % 2 == 0 {
        target[num / 2].im = 0.0;
    }

    let mut out = c2r.make_output_vec();
    c2r.process(&mut target, &mut out).map_err(spectral)?;
    let scale = 1.0 / nx as f64;
    Ok(out.into_iter().map(|v| v * scale).collect())
}

/// First index of the largest probability.
fn argmax(probs: &[f64]) -> usize {
    let mut best = 0;
    for (i, &p) in probs.iter().enumerate().skip(1) {
        if p > probs[best] {
            best = i;
        }
    }
    best
}
