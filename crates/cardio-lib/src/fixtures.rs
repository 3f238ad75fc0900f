//! Synthetic recordings shared by unit tests.

use crate::signal::TimeSeries;
use std::f64::consts::PI;

/// Gaussian QRS bumps at the given RR spacing (seconds) over a slow baseline
/// wander. Returns the series and the beat sample positions.
pub(crate) fn synthetic_timeseries(fs: f64, rr: &[f64]) -> (TimeSeries, Vec<usize>) {
    let mut beats = Vec::with_capacity(rr.len() + 1);
    let mut t = 0.5;
    beats.push(t);
    for &interval in rr {
        t += interval;
        beats.push(t);
    }
    let duration = beats.last().copied().unwrap_or(1.0) + 1.0;
    let samples = (duration * fs) as usize;
    let mut data = Vec::with_capacity(samples);
    for i in 0..samples {
        let time = i as f64 / fs;
        let mut v = 0.05 * (2.0 * PI * 1.0 * time).sin();
        for &bt in &beats {
            let width = 0.02;
            let amp = (-0.5 * ((time - bt) / width).powi(2)).exp();
            v += 1.2 * amp;
        }
        data.push(v);
    }
    let beat_samples = beats.iter().map(|bt| (bt * fs).round() as usize).collect();
    (TimeSeries { fs, data }, beat_samples)
}

/// Regular rhythm lasting at least `seconds`.
pub(crate) fn regular_rhythm(fs: f64, rr_s: f64, seconds: f64) -> (TimeSeries, Vec<usize>) {
    let beats = ((seconds - 1.5) / rr_s).ceil().max(1.0) as usize;
    synthetic_timeseries(fs, &vec![rr_s; beats])
}
