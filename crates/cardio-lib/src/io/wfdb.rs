use crate::signal::Recording;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// One entry of an MIT annotation stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WfdbAnnotation {
    pub sample: usize,
    pub code: u8,
}

impl WfdbAnnotation {
    /// True for codes WFDB counts as QRS complexes.
    pub fn is_beat(&self) -> bool {
        matches!(self.code, 1..=13 | 25 | 30 | 34 | 35 | 38 | 41)
    }

    /// Standard MIT-BIH mnemonic for the code.
    pub fn symbol(&self) -> &'static str {
        match self.code {
            1 => "N",
            2 => "L",
            3 => "R",
            4 => "a",
            5 => "V",
            6 => "F",
            7 => "J",
            8 => "A",
            9 => "S",
            10 => "E",
            11 => "j",
            12 => "/",
            13 => "Q",
            14 => "~",
            16 => "|",
            18 => "s",
            19 => "T",
            20 => "*",
            21 => "D",
            22 => "\"",
            23 => "=",
            24 => "p",
            25 => "B",
            26 => "^",
            27 => "t",
            28 => "+",
            29 => "u",
            30 => "?",
            31 => "!",
            32 => "[",
            33 => "]",
            34 => "e",
            35 => "n",
            36 => "@",
            37 => "x",
            38 => "f",
            39 => "(",
            40 => ")",
            41 => "r",
            _ => "?",
        }
    }
}

/// Beat annotations supplied alongside a record, for validation and plotting only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BeatAnnotations {
    pub samples: Vec<usize>,
    pub symbols: Vec<String>,
}

/// Load every signal of a WFDB header/data pair, ADC units converted to physical units.
pub fn load_wfdb_record(header_path: &Path) -> Result<Recording> {
    if !header_path.exists() {
        anyhow::bail!("WFDB header {} does not exist", header_path.display());
    }
    let (header, signals) = wfdb_rust::parse_wfdb(header_path);
    if signals.is_empty() {
        anyhow::bail!("WFDB record {} has no signals", header_path.display());
    }
    let fs = header
        .record
        .sampling_frequency
        .map(|f| f as f64)
        .with_context(|| format!("{} does not declare a sampling frequency", header_path.display()))?;
    let channels = signals
        .iter()
        .zip(&header.signal_specs)
        .map(|(raw, spec)| {
            let gain = spec.adc_gain.unwrap_or(1.0) as f64;
            let baseline = spec.baseline.or(spec.adc_zero).unwrap_or(0) as f64;
            raw.iter()
                .map(|&sample| (sample as f64 - baseline) / gain)
                .collect()
        })
        .collect();
    Ok(Recording::from_channels(fs, channels))
}

/// Parse MIT annotation binary stream into samples & codes.
pub fn parse_wfdb_annotations(buf: &[u8]) -> Vec<WfdbAnnotation> {
    let mut out = Vec::new();
    let mut idx = 0;
    let mut sample: usize = 0;
    while idx + 2 <= buf.len() {
        let word = u16::from_le_bytes([buf[idx], buf[idx + 1]]);
        idx += 2;
        let code = (word >> 10) as u8;
        let diff = (word & 0x03FF) as usize;
        match code {
            0 if diff == 0 => break,
            // SKIP: 32-bit interval, high word first
            59 => {
                if idx + 4 > buf.len() {
                    break;
                }
                let high = u16::from_le_bytes([buf[idx], buf[idx + 1]]) as u32;
                let low = u16::from_le_bytes([buf[idx + 2], buf[idx + 3]]) as u32;
                idx += 4;
                sample = sample.wrapping_add(((high << 16) | low) as usize);
            }
            // NUM/SUB/CHN modify the previous annotation only
            60..=62 => {}
            // AUX: `diff` bytes of payload, padded to even length
            63 => {
                idx += diff + (diff % 2);
            }
            _ => {
                sample = sample.wrapping_add(diff);
                out.push(WfdbAnnotation { sample, code });
            }
        }
    }
    out
}

/// Read an annotation file (`.atr`, `.qrs`) and keep the beat entries.
pub fn load_wfdb_annotations(path: &Path) -> Result<BeatAnnotations> {
    let buf = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let (samples, symbols) = parse_wfdb_annotations(&buf)
        .into_iter()
        .filter(WfdbAnnotation::is_beat)
        .map(|ann| (ann.sample, ann.symbol().to_string()))
        .unzip();
    Ok(BeatAnnotations { samples, symbols })
}

/// Annotation file next to a header, preferring `.atr` over `.qrs`.
pub fn find_annotation_file(header_path: &Path) -> Option<PathBuf> {
    ["atr", "qrs"]
        .iter()
        .map(|ext| header_path.with_extension(ext))
        .find(|p| p.is_file())
}
