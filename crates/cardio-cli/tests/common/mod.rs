#![allow(dead_code)]

use std::f64::consts::PI;
use std::path::{Path, PathBuf};

/// Gaussian QRS bumps every `rr_s` seconds over a 1 Hz baseline ripple.
pub fn synthetic_ecg(fs: f64, rr_s: f64, seconds: f64) -> (Vec<f64>, Vec<usize>) {
    let mut beats = Vec::new();
    let mut t = 0.5;
    while t < seconds - 1.0 {
        beats.push(t);
        t += rr_s;
    }
    let data = (0..(seconds * fs) as usize)
        .map(|i| {
            let time = i as f64 / fs;
            let qrs: f64 = beats
                .iter()
                .map(|bt| 1.2 * (-0.5 * ((time - bt) / 0.02).powi(2)).exp())
                .sum();
            qrs + 0.05 * (2.0 * PI * time).sin()
        })
        .collect();
    let samples = beats.iter().map(|bt| (bt * fs).round() as usize).collect();
    (data, samples)
}

pub fn write_lines(dir: &Path, name: &str, values: &[f64]) -> PathBuf {
    let path = dir.join(name);
    let body: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    std::fs::write(&path, body.join("\n")).expect("write fixture");
    path
}

/// Two-column comma separated recording.
pub fn write_two_leads(dir: &Path, name: &str, a: &[f64], b: &[f64]) -> PathBuf {
    let path = dir.join(name);
    let body: Vec<String> = a.iter().zip(b).map(|(x, y)| format!("{x},{y}")).collect();
    std::fs::write(&path, body.join("\n")).expect("write fixture");
    path
}

/// Softmax model whose zero weights make `class` win for every window.
pub fn write_constant_model(dir: &Path, input_len: usize, class: usize) -> PathBuf {
    let mut bias = vec![0.0; 5];
    bias[class] = 1.0;
    let model = serde_json::json!({
        "input_len": input_len,
        "weights": vec![vec![0.0; input_len]; 5],
        "bias": bias,
    });
    let path = dir.join("model.json");
    std::fs::write(&path, model.to_string()).expect("write model");
    path
}

pub fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
