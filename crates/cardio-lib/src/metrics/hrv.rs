use crate::{
    error::EcgError,
    signal::{mean, std_dev, RRSeries},
};
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Thresholds and spectral band layout for HRV estimation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HrvConfig {
    /// Successive-difference threshold counted by PRR (ms).
    pub nn_threshold_ms: f64,
    /// PSD bins `[0, vlf_bin_end)` form the very-low band.
    pub vlf_bin_end: usize,
    /// PSD bins `[vlf_bin_end, lf_bin_end)` form the low band.
    pub lf_bin_end: usize,
    /// PSD bins `[lf_bin_end, hf_bin_end)` form the high band.
    pub hf_bin_end: usize,
}

impl Default for HrvConfig {
    fn default() -> Self {
        Self {
            nn_threshold_ms: 50.0,
            vlf_bin_end: 4,
            lf_bin_end: 15,
            hf_bin_end: 40,
        }
    }
}

impl HrvConfig {
    pub fn validate(&self) -> Result<(), EcgError> {
        if !(self.nn_threshold_ms.is_finite() && self.nn_threshold_ms >= 0.0) {
            return Err(EcgError::invalid("PRR threshold must be a non-negative number of ms"));
        }
        if !(self.vlf_bin_end <= self.lf_bin_end && self.lf_bin_end <= self.hf_bin_end) {
            return Err(EcgError::invalid(format!(
                "band bin cutoffs must be ordered, got {} / {} / {}",
                self.vlf_bin_end, self.lf_bin_end, self.hf_bin_end
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HrvTime {
    pub sdrr: f64,
    pub rmssd: f64,
    pub prr: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HrvPsd {
    pub vlf: f64,
    pub lf: f64,
    pub hf: f64,
    pub freqs: Vec<f64>,
    pub psd: Vec<f64>,
}

/// Per-lead HRV summary, keyed the way reports expect it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HrvMetrics {
    #[serde(rename = "SDRR")]
    pub sdrr: f64,
    #[serde(rename = "RMSSD")]
    pub rmssd: f64,
    #[serde(rename = "PRR")]
    pub prr: f64,
    #[serde(rename = "VLF Power")]
    pub vlf_power: f64,
    #[serde(rename = "LF Power")]
    pub lf_power: f64,
    #[serde(rename = "HF Power")]
    pub hf_power: f64,
    #[serde(rename = "PSD")]
    pub psd: Vec<f64>,
    #[serde(rename = "PSD Frequencies")]
    pub psd_freqs: Vec<f64>,
}

fn require_beats(rr: &RRSeries) -> Result<(), EcgError> {
    if rr.len() < 2 {
        return Err(EcgError::InsufficientBeats {
            intervals: rr.len(),
        });
    }
    Ok(())
}

/// SDRR (population SD), RMSSD, and PRR (% of successive differences above threshold).
pub fn hrv_time(rr: &RRSeries, cfg: &HrvConfig) -> Result<HrvTime, EcgError> {
    require_beats(rr)?;
    let diffs: Vec<f64> = rr.rr.windows(2).map(|w| w[1] - w[0]).collect();
    let sdrr = std_dev(&rr.rr);
    let rmssd = (diffs.iter().map(|d| d * d).sum::<f64>() / diffs.len() as f64).sqrt();
    let over = diffs
        .iter()
        .filter(|d| d.abs() > cfg.nn_threshold_ms)
        .count();
    let prr = 100.0 * over as f64 / diffs.len() as f64;
    Ok(HrvTime { sdrr, rmssd, prr })
}

/// Welch PSD of the RR sequence, one segment spanning every interval.
///
/// The sequence is treated as sampled once per beat, at `1000 / mean(rr)` Hz.
pub fn hrv_psd(rr: &RRSeries, cfg: &HrvConfig) -> Result<HrvPsd, EcgError> {
    require_beats(rr)?;
    let mean_rr = mean(&rr.rr);
    if !(mean_rr.is_finite() && mean_rr > 0.0) {
        return Err(EcgError::invalid(format!(
            "RR intervals must be positive, mean was {mean_rr} ms"
        )));
    }
    let fs_rr = 1000.0 / mean_rr;
    let (freqs, psd) = welch_psd(&rr.rr, fs_rr, rr.len())?;
    let vlf = integrate_bins(&psd, 0, cfg.vlf_bin_end);
    let lf = integrate_bins(&psd, cfg.vlf_bin_end, cfg.lf_bin_end);
    let hf = integrate_bins(&psd, cfg.lf_bin_end, cfg.hf_bin_end);
    Ok(HrvPsd {
        vlf,
        lf,
        hf,
        freqs,
        psd,
    })
}

/// Time- and frequency-domain HRV for one lead's RR intervals (ms).
pub fn hrv_metrics(rr: &RRSeries, cfg: &HrvConfig) -> Result<HrvMetrics, EcgError> {
    cfg.validate()?;
    let time = hrv_time(rr, cfg)?;
    let spectrum = hrv_psd(rr, cfg)?;
    Ok(HrvMetrics {
        sdrr: time.sdrr,
        rmssd: time.rmssd,
        prr: time.prr,
        vlf_power: spectrum.vlf,
        lf_power: spectrum.lf,
        hf_power: spectrum.hf,
        psd: spectrum.psd,
        psd_freqs: spectrum.freqs,
    })
}

/// Trapezoidal area over `psd[start..end]` with unit bin spacing.
fn integrate_bins(psd: &[f64], start: usize, end: usize) -> f64 {
    let end = end.min(psd.len());
    if start >= end {
        return 0.0;
    }
    psd[start..end]
        .windows(2)
        .map(|w| 0.5 * (w[0] + w[1]))
        .sum()
}

/// One-sided Welch density estimate: periodic Hann window, 50 % overlap,
/// per-segment mean removal.
pub fn welch_psd(
    signal: &[f64],
    fs: f64,
    nperseg: usize,
) -> Result<(Vec<f64>, Vec<f64>), EcgError> {
    let n = signal.len();
    let window = nperseg.min(n);
    if window == 0 {
        return Ok((Vec::new(), Vec::new()));
    }
    let step = window - window / 2;
    let taper = hann(window);
    let taper_energy: f64 = taper.iter().map(|w| w * w).sum();
    let bins = window / 2 + 1;
    let freqs: Vec<f64> = (0..bins).map(|k| k as f64 * fs / window as f64).collect();
    let mut powers = vec![0.0; bins];
    if taper_energy == 0.0 {
        return Ok((freqs, powers));
    }

    let mut planner = RealFftPlanner::<f64>::new();
    let r2c = planner.plan_fft_forward(window);
    let mut spectrum = r2c.make_output_vec();
    let scale = 1.0 / (fs * taper_energy);
    let mut segments = 0;
    let mut pos = 0;
    while pos + window <= n {
        let slice = &signal[pos..pos + window];
        let offset = mean(slice);
        let mut frame: Vec<f64> = slice
            .iter()
            .zip(&taper)
            .map(|(x, w)| (x - offset) * w)
            .collect();
        r2c.process(&mut frame, &mut spectrum)
            .map_err(|e| EcgError::Spectral(e.to_string()))?;
        for (k, val) in spectrum.iter().enumerate() {
            let edge = k == 0 || (window % 2 == 0 && k == window / 2);
            let fold = if edge { 1.0 } else { 2.0 };
            powers[k] += fold * val.norm_sqr() * scale;
        }
        segments += 1;
        pos += step;
    }
    if segments > 0 {
        for p in powers.iter_mut() {
            *p /= segments as f64;
        }
    }
    Ok((freqs, powers))
}

fn hann(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / (size as f64)).cos()))
        .collect()
}
