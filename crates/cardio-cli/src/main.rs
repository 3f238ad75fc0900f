use anyhow::{anyhow, Context, Result};
use cardio_lib::{
    classify::{classify_segments, summarize, ClassificationSummary, SegmentLabel},
    detectors::ecg::{detect_r_peaks, score_detections, DetectionScore},
    filter::bandpass,
    io::{delimited, edf, find_record_file, text as text_io, wfdb as wfdb_io, RecordSource},
    metrics::hrv::hrv_metrics,
    model::{InferenceModel, LinearSoftmaxModel},
    pipeline::{AnalysisConfig, AnalysisResult, Analyzer},
    signal::{RRSeries, Recording, TimeSeries},
};
use clap::{Args, Parser, Subcommand};
use log::info;
use serde::Serialize;
use std::{
    collections::BTreeMap,
    fs,
    io::{self, BufWriter, Read, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

#[derive(Parser)]
#[command(
    name = "cardio",
    version,
    about = "Cardio: ECG filtering, R-peak detection, HRV and rhythm classification"
)]
struct Cli {
    /// Default log filter when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

/// Where the samples come from. Without a file option, text is read from stdin.
#[derive(Args)]
struct RecordArgs {
    /// Sampling frequency of --input / stdin text (Hz)
    #[arg(long, default_value_t = 250.0)]
    fs: f64,
    /// Comma or whitespace separated samples, one column per lead
    #[arg(long)]
    input: Option<PathBuf>,
    #[arg(long, conflicts_with_all = ["input", "edf"])]
    wfdb_header: Option<PathBuf>,
    #[arg(long, conflicts_with = "input")]
    edf: Option<PathBuf>,
    /// Use the newest .dat/.hea/.edf/.csv/.txt file in this directory
    #[arg(long, conflicts_with_all = ["input", "wfdb_header", "edf"])]
    input_dir: Option<PathBuf>,
    /// Keep only the first N leads
    #[arg(long)]
    max_leads: Option<usize>,
}

#[derive(Args)]
struct ConfigArgs {
    /// TOML file with [filter], [detector], [hrv] and [classifier] sections
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    order: Option<usize>,
    #[arg(long)]
    lowcut_hz: Option<f64>,
    #[arg(long)]
    highcut_hz: Option<f64>,
    #[arg(long)]
    window_seconds: Option<f64>,
    #[arg(long)]
    target_len: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Full per-lead analysis: filter, R-peaks, HRV, segment labels
    Analyze {
        #[command(flatten)]
        record: RecordArgs,
        #[command(flatten)]
        config: ConfigArgs,
        /// LinearSoftmaxModel JSON artifact
        #[arg(long)]
        model: PathBuf,
        /// Reference beats (.atr/.qrs or newline-delimited indices); bare flag
        /// looks next to the WFDB header
        #[arg(long, num_args = 0..=1)]
        annotations: Option<Option<PathBuf>>,
        /// Match window when scoring detections against annotations
        #[arg(long, default_value_t = 150.0)]
        tolerance_ms: f64,
        /// Process leads on scoped worker threads
        #[arg(long)]
        parallel: bool,
    },
    /// Zero-phase band-pass of one lead, one sample per output line
    Filter {
        #[command(flatten)]
        record: RecordArgs,
        #[command(flatten)]
        config: ConfigArgs,
        #[arg(long, default_value_t = 0)]
        lead: usize,
    },
    /// Band-pass + R-peak detection of one lead
    FindRpeaks {
        #[command(flatten)]
        record: RecordArgs,
        #[command(flatten)]
        config: ConfigArgs,
        #[arg(long, default_value_t = 0)]
        lead: usize,
    },
    /// HRV metrics from newline-delimited RR intervals (milliseconds)
    Hrv {
        #[arg(long)]
        input: Option<PathBuf>,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Band-pass + fixed-window classification of one lead
    Classify {
        #[command(flatten)]
        record: RecordArgs,
        #[command(flatten)]
        config: ConfigArgs,
        #[arg(long)]
        model: PathBuf,
        #[arg(long, default_value_t = 0)]
        lead: usize,
    },
}

#[derive(Serialize)]
struct AnalyzeOutput {
    #[serde(flatten)]
    result: AnalysisResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    annotation_samples: Option<Vec<usize>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    annotation_symbols: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detection_scores: Option<BTreeMap<String, DetectionScore>>,
}

#[derive(Serialize)]
struct ClassifyOutput {
    labels: Vec<SegmentLabel>,
    summary: ClassificationSummary,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(cli.log_level.as_str()),
    )
    .init();
    match cli.command {
        Commands::Analyze {
            record,
            config,
            model,
            annotations,
            tolerance_ms,
            parallel,
        } => cmd_analyze(
            &record,
            &config,
            &model,
            annotations.as_ref().map(|path| path.as_deref()),
            tolerance_ms,
            parallel,
        )?,
        Commands::Filter {
            record,
            config,
            lead,
        } => cmd_filter(&record, &config, lead)?,
        Commands::FindRpeaks {
            record,
            config,
            lead,
        } => cmd_find_rpeaks(&record, &config, lead)?,
        Commands::Hrv { input, config } => cmd_hrv(input.as_deref(), &config)?,
        Commands::Classify {
            record,
            config,
            model,
            lead,
        } => cmd_classify(&record, &config, &model, lead)?,
    }
    Ok(())
}

fn load_config(args: &ConfigArgs) -> Result<AnalysisConfig> {
    let mut cfg = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str::<AnalysisConfig>(&text)
                .with_context(|| format!("invalid configuration in {}", path.display()))?
        }
        None => AnalysisConfig::default(),
    };
    if let Some(order) = args.order {
        cfg.filter.order = order;
    }
    if let Some(lowcut) = args.lowcut_hz {
        cfg.filter.lowcut_hz = lowcut;
    }
    if let Some(highcut) = args.highcut_hz {
        cfg.filter.highcut_hz = highcut;
    }
    if let Some(window) = args.window_seconds {
        cfg.classifier.window_seconds = window;
    }
    if let Some(target_len) = args.target_len {
        cfg.classifier.target_len = target_len;
    }
    Ok(cfg)
}

fn read_stdin() -> Result<String> {
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .context("failed to read samples from stdin")?;
    Ok(buf)
}

/// File behind the record options; `None` means stdin.
fn record_source(args: &RecordArgs) -> Result<Option<RecordSource>> {
    let source = if let Some(dir) = &args.input_dir {
        Some(RecordSource::classify(&find_record_file(dir)?))
    } else if let Some(header) = &args.wfdb_header {
        Some(RecordSource::Wfdb(header.clone()))
    } else if let Some(path) = &args.edf {
        Some(RecordSource::Edf(path.clone()))
    } else {
        args.input.clone().map(RecordSource::Delimited)
    };
    Ok(source)
}

fn load_recording(args: &RecordArgs) -> Result<Recording> {
    read_recording(args, record_source(args)?.as_ref())
}

fn read_recording(args: &RecordArgs, source: Option<&RecordSource>) -> Result<Recording> {
    let mut recording = match source {
        Some(RecordSource::Wfdb(header)) => wfdb_io::load_wfdb_record(header)?,
        Some(RecordSource::Edf(path)) => edf::load_edf_recording(path)?,
        Some(RecordSource::Delimited(path)) => {
            delimited::read_delimited_recording(path, args.fs, args.max_leads)?
        }
        None => delimited::parse_delimited_recording(&read_stdin()?, args.fs, args.max_leads)?,
    };
    if let Some(max) = args.max_leads {
        recording.leads.truncate(max);
    }
    info!(
        "loaded {} lead(s), {} samples at {} Hz",
        recording.leads.len(),
        recording.sample_count(),
        recording.fs
    );
    Ok(recording)
}

fn load_lead(args: &RecordArgs, lead: usize) -> Result<TimeSeries> {
    let recording = load_recording(args)?;
    recording.lead_series(lead).ok_or_else(|| {
        anyhow!(
            "lead {} out of range: recording has {} lead(s)",
            lead,
            recording.leads.len()
        )
    })
}

fn load_model(path: &Path, cfg: &AnalysisConfig) -> Result<LinearSoftmaxModel> {
    let model = LinearSoftmaxModel::load(path)?;
    if model.input_len() != cfg.classifier.target_len {
        return Err(anyhow!(
            "model {} expects {} samples per window but target_len is {}",
            path.display(),
            model.input_len(),
            cfg.classifier.target_len
        ));
    }
    Ok(model)
}

fn load_reference_beats(
    annotations: Option<&Path>,
    wfdb_header: Option<&Path>,
) -> Result<wfdb_io::BeatAnnotations> {
    let path = match (annotations, wfdb_header) {
        (Some(path), _) => path.to_path_buf(),
        (None, Some(header)) => wfdb_io::find_annotation_file(header).ok_or_else(|| {
            anyhow!("no .atr or .qrs file next to {}", header.display())
        })?,
        (None, None) => return Err(anyhow!("--annotations needs a path without a WFDB record")),
    };
    let is_wfdb = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("atr") || ext.eq_ignore_ascii_case("qrs"));
    if is_wfdb {
        wfdb_io::load_wfdb_annotations(&path)
    } else {
        let events = text_io::read_events(&path)?;
        Ok(wfdb_io::BeatAnnotations {
            samples: events.indices,
            symbols: Vec::new(),
        })
    }
}

fn cmd_analyze(
    record: &RecordArgs,
    config: &ConfigArgs,
    model_path: &Path,
    annotations: Option<Option<&Path>>,
    tolerance_ms: f64,
    parallel: bool,
) -> Result<()> {
    let cfg = load_config(config)?;
    let source = record_source(record)?;
    let recording = read_recording(record, source.as_ref())?;
    let model = load_model(model_path, &cfg)?;
    let analyzer = Analyzer::new(Arc::new(model), cfg)?;
    let result = if parallel {
        analyzer.analyze_parallel(&recording)?
    } else {
        analyzer.analyze(&recording)?
    };

    let mut output = AnalyzeOutput {
        result,
        annotation_samples: None,
        annotation_symbols: None,
        detection_scores: None,
    };
    if let Some(path) = annotations {
        let header = match &source {
            Some(RecordSource::Wfdb(header)) => Some(header.as_path()),
            _ => None,
        };
        let beats = load_reference_beats(path, header)?;
        let tolerance = (tolerance_ms * recording.fs / 1000.0).round() as usize;
        let scores = output
            .result
            .completed()
            .map(|lead| {
                (
                    lead.lead.clone(),
                    score_detections(&beats.samples, &lead.peaks.indices, tolerance),
                )
            })
            .collect();
        output.detection_scores = Some(scores);
        output.annotation_samples = Some(beats.samples);
        output.annotation_symbols = Some(beats.symbols);
    }
    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}

fn cmd_filter(record: &RecordArgs, config: &ConfigArgs, lead: usize) -> Result<()> {
    let cfg = load_config(config)?;
    let ts = load_lead(record, lead)?;
    let filtered = bandpass(&ts, &cfg.filter)?;
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for sample in &filtered.data {
        writeln!(out, "{sample}")?;
    }
    out.flush()?;
    Ok(())
}

fn cmd_find_rpeaks(record: &RecordArgs, config: &ConfigArgs, lead: usize) -> Result<()> {
    let cfg = load_config(config)?;
    let ts = load_lead(record, lead)?;
    let filtered = bandpass(&ts, &cfg.filter)?;
    let events = detect_r_peaks(&filtered, &cfg.detector)?;
    println!("{}", serde_json::to_string(&events)?);
    Ok(())
}

fn cmd_hrv(input: Option<&Path>, config: &ConfigArgs) -> Result<()> {
    let cfg = load_config(config)?;
    let rr = match input {
        Some(path) => text_io::read_rr_series(path)?,
        None => RRSeries {
            rr: text_io::parse_f64_series(&read_stdin()?)?,
        },
    };
    let metrics = hrv_metrics(&rr, &cfg.hrv)?;
    println!("{}", serde_json::to_string(&metrics)?);
    Ok(())
}

fn cmd_classify(
    record: &RecordArgs,
    config: &ConfigArgs,
    model_path: &Path,
    lead: usize,
) -> Result<()> {
    let cfg = load_config(config)?;
    let model = load_model(model_path, &cfg)?;
    let ts = load_lead(record, lead)?;
    let filtered = bandpass(&ts, &cfg.filter)?;
    let labels = classify_segments(&model, &filtered, &cfg.classifier)?;
    let summary = summarize(&labels);
    println!(
        "{}",
        serde_json::to_string(&ClassifyOutput { labels, summary })?
    );
    Ok(())
}
