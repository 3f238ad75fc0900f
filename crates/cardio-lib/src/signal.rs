use crate::error::EcgError;
use serde::{Deserialize, Serialize};

/// One lead sampled at a uniform rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Uniform sampling frequency in Hz
    pub fs: f64,
    /// Samples
    pub data: Vec<f64>,
}

impl TimeSeries {
    pub fn new(fs: f64, data: Vec<f64>) -> Self {
        Self { fs, data }
    }
    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Point events on a timeline (e.g., R-peaks indices)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Events {
    pub indices: Vec<usize>,
}

impl Events {
    pub fn from_indices(indices: Vec<usize>) -> Self {
        Self { indices }
    }
    pub fn len(&self) -> usize {
        self.indices.len()
    }
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// RR intervals in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RRSeries {
    pub rr: Vec<f64>,
}

impl RRSeries {
    /// Consecutive peak differences, converted with `1000 / fs` ms per sample.
    pub fn from_events(events: &Events, fs: f64) -> Self {
        let ms_per_sample = 1000.0 / fs;
        let rr = events
            .indices
            .windows(2)
            .map(|w| (w[1] as f64 - w[0] as f64) * ms_per_sample)
            .collect();
        Self { rr }
    }
    pub fn len(&self) -> usize {
        self.rr.len()
    }
    pub fn is_empty(&self) -> bool {
        self.rr.is_empty()
    }
}

/// A named channel of a multi-lead recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub name: String,
    pub data: Vec<f64>,
}

/// Multi-lead recording sharing one sampling frequency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub fs: f64,
    pub leads: Vec<Lead>,
}

impl Recording {
    pub fn new(fs: f64) -> Self {
        Self {
            fs,
            leads: Vec::new(),
        }
    }

    /// Build a recording from unnamed channels, naming them `lead1..leadN`.
    pub fn from_channels(fs: f64, channels: Vec<Vec<f64>>) -> Self {
        let leads = channels
            .into_iter()
            .enumerate()
            .map(|(i, data)| Lead {
                name: lead_name(i),
                data,
            })
            .collect();
        Self { fs, leads }
    }

    pub fn with_lead(mut self, name: impl Into<String>, data: Vec<f64>) -> Self {
        self.leads.push(Lead {
            name: name.into(),
            data,
        });
        self
    }

    pub fn lead_series(&self, index: usize) -> Option<TimeSeries> {
        self.leads
            .get(index)
            .map(|lead| TimeSeries::new(self.fs, lead.data.clone()))
    }

    pub fn sample_count(&self) -> usize {
        self.leads.iter().map(|l| l.data.len()).max().unwrap_or(0)
    }
}

/// Default channel naming, 1-based.
pub fn lead_name(index: usize) -> String {
    format!("lead{}", index + 1)
}

pub(crate) fn check_fs(fs: f64) -> Result<(), EcgError> {
    if fs.is_finite() && fs > 0.0 {
        Ok(())
    } else {
        Err(EcgError::invalid(format!(
            "sampling frequency must be positive, got {fs}"
        )))
    }
}

pub(crate) fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Population standard deviation (ddof = 0).
pub(crate) fn std_dev(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let m = mean(data);
    (data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / data.len() as f64).sqrt()
}
