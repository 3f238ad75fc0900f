use crate::{
    error::EcgError,
    signal::{check_fs, std_dev, Events, TimeSeries},
};
use log::debug;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Configurable parameters for the moving-average dual-threshold R-peak detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Smoothing window length (seconds).
    pub window_s: f64,
    /// Strict threshold, in standard deviations of the smoothed envelope.
    pub high_threshold_sd: f64,
    /// Lenient threshold, in standard deviations of the smoothed envelope.
    pub low_threshold_sd: f64,
    /// Minimum peak spacing as a fraction of the smoothing window.
    pub distance_fraction: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window_s: 0.10,
            high_threshold_sd: 0.5,
            low_threshold_sd: 0.3,
            distance_fraction: 0.5,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), EcgError> {
        if !(self.window_s.is_finite() && self.window_s > 0.0) {
            return Err(EcgError::invalid(format!(
                "detector window must be positive, got {} s",
                self.window_s
            )));
        }
        let (low, high) = (self.low_threshold_sd, self.high_threshold_sd);
        if !(low.is_finite() && high.is_finite() && 0.0 <= low && low <= high) {
            return Err(EcgError::invalid(format!(
                "detector thresholds must satisfy 0 <= low <= high, got {low} / {high}"
            )));
        }
        if !(self.distance_fraction.is_finite() && self.distance_fraction > 0.0) {
            return Err(EcgError::invalid("detector distance fraction must be positive"));
        }
        Ok(())
    }

    /// Smoothing window in samples.
    pub fn window_len(&self, fs: f64) -> usize {
        ((self.window_s * fs) as usize).max(1)
    }

    /// Minimum inter-peak distance in samples.
    pub fn min_distance(&self, fs: f64) -> usize {
        ((self.window_len(fs) as f64 * self.distance_fraction) as usize).max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Confidence {
    Lenient,
    Strict,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    index: usize,
    height: f64,
    confidence: Confidence,
}

/// Detect R-peaks in a filtered lead using the default detector settings.
pub fn detect_peaks(data: &[f64], fs: f64) -> Result<Events, EcgError> {
    detect_r_peaks(
        &TimeSeries::new(fs, data.to_vec()),
        &DetectorConfig::default(),
    )
}

/// Detect R-peaks on the smoothed envelope of `ts`.
///
/// Local maxima of the envelope are tagged strict (above the high threshold)
/// or lenient (above the low threshold only). Minimum spacing is enforced
/// over all tagged candidates, tallest first, and only strict candidates
/// survive. The result equals intersecting two independent threshold passes
/// without smoothing twice.
pub fn detect_r_peaks(ts: &TimeSeries, cfg: &DetectorConfig) -> Result<Events, EcgError> {
    check_fs(ts.fs)?;
    cfg.validate()?;

    let window = cfg.window_len(ts.fs);
    if ts.len() < window.max(3) {
        return Ok(Events::default());
    }

    let envelope = moving_average(&ts.data, window);
    let sd = std_dev(&envelope);
    if !(sd.is_finite() && sd > 0.0) || is_flat(&envelope) {
        return Ok(Events::default());
    }
    let high = cfg.high_threshold_sd * sd;
    let low = cfg.low_threshold_sd * sd;

    let candidates = tagged_candidates(&envelope, high, low);
    let kept = enforce_distance(&candidates, cfg.min_distance(ts.fs));
    let indices: Vec<usize> = candidates
        .iter()
        .zip(kept)
        .filter(|(c, keep)| *keep && c.confidence == Confidence::Strict)
        .map(|(c, _)| c.index)
        .collect();

    debug!(
        "detected {} R-peaks from {} candidates (window {} samples)",
        indices.len(),
        candidates.len(),
        window
    );
    Ok(Events::from_indices(indices))
}

/// Centred moving average normalised by the number of in-range samples.
fn moving_average(data: &[f64], win: usize) -> Vec<f64> {
    let n = data.len();
    if win <= 1 {
        return data.to_vec();
    }
    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0);
    let mut acc = 0.0;
    for &x in data {
        acc += x;
        prefix.push(acc);
    }
    let half = win / 2;
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + win - half).min(n);
            (prefix[hi] - prefix[lo]) / (hi - lo) as f64
        })
        .collect()
}

/// Envelope spread no larger than the rounding left by the running sums.
fn is_flat(envelope: &[f64]) -> bool {
    let (min, max) = envelope
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let scale = min.abs().max(max.abs());
    max - min <= 4.0 * f64::EPSILON * envelope.len() as f64 * scale
}

/// Local maxima (plateaus resolve to their midpoint) above the lenient threshold.
fn tagged_candidates(envelope: &[f64], high: f64, low: f64) -> Vec<Candidate> {
    let n = envelope.len();
    let mut out = Vec::new();
    let mut i = 1;
    while i + 1 < n {
        if envelope[i - 1] < envelope[i] {
            let mut ahead = i + 1;
            while ahead + 1 < n && envelope[ahead] == envelope[i] {
                ahead += 1;
            }
            if envelope[ahead] < envelope[i] {
                let index = (i + ahead - 1) / 2;
                let height = envelope[index];
                if height >= low {
                    let confidence = if height >= high {
                        Confidence::Strict
                    } else {
                        Confidence::Lenient
                    };
                    out.push(Candidate {
                        index,
                        height,
                        confidence,
                    });
                }
                i = ahead;
            }
        }
        i += 1;
    }
    out
}

/// Keep-mask after removing candidates closer than `distance` to a taller kept one.
fn enforce_distance(candidates: &[Candidate], distance: usize) -> Vec<bool> {
    let n = candidates.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        candidates[a]
            .height
            .partial_cmp(&candidates[b].height)
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    });
    let mut keep = vec![true; n];
    for &j in order.iter().rev() {
        if !keep[j] {
            continue;
        }
        let pos = candidates[j].index;
        for k in (0..j).rev() {
            if pos - candidates[k].index >= distance {
                break;
            }
            keep[k] = false;
        }
        for k in j + 1..n {
            if candidates[k].index - pos >= distance {
                break;
            }
            keep[k] = false;
        }
    }
    keep
}

/// Agreement between detected peaks and reference beat annotations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionScore {
    pub annotated: usize,
    pub detected: usize,
    pub matched: usize,
    pub sensitivity: f64,
    pub positive_predictivity: f64,
}

/// Count annotations with a detection within `tolerance` samples.
pub fn score_detections(annotated: &[usize], detected: &[usize], tolerance: usize) -> DetectionScore {
    let mut matched = 0;
    let mut idx = 0;
    if !detected.is_empty() {
        for &ann in annotated {
            while idx < detected.len() && detected[idx] + tolerance < ann {
                idx += 1;
            }
            let near = |d: usize| d.abs_diff(ann) <= tolerance;
            if (idx < detected.len() && near(detected[idx])) || (idx > 0 && near(detected[idx - 1]))
            {
                matched += 1;
            }
        }
    }
    let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
    DetectionScore {
        annotated: annotated.len(),
        detected: detected.len(),
        matched,
        sensitivity: ratio(matched, annotated.len()),
        positive_predictivity: ratio(matched.min(detected.len()), detected.len()),
    }
}
