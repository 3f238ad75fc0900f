use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures raised by the signal core.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EcgError {
    /// Bad filter order/cutoffs, non-positive sampling frequency, etc.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// Waveform shorter than one filter transient or detection window.
    #[error("insufficient data: need more than {needed} samples, got {got}")]
    InsufficientData { needed: usize, got: usize },
    /// Fewer than two RR intervals available for HRV statistics.
    #[error("insufficient beats: HRV needs at least 2 RR intervals, got {intervals}")]
    InsufficientBeats { intervals: usize },
    /// The inference model is missing, unreadable or misbehaving.
    #[error("inference model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("spectral transform failed: {0}")]
    Spectral(String),
}

impl EcgError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        EcgError::InvalidParameter(msg.into())
    }
}

/// Kind of a per-lead failure absorbed by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InsufficientData,
    InsufficientBeats,
    CorruptSamples,
}

/// Serialisable failure marker recorded in place of a per-lead output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl LeadFailure {
    pub fn corrupt_samples(non_finite: usize) -> Self {
        Self {
            kind: FailureKind::CorruptSamples,
            message: format!("lead contains {non_finite} non-finite samples"),
        }
    }

    /// Map a numerical error into a per-lead marker; request-level errors yield `None`.
    pub fn from_error(err: &EcgError) -> Option<Self> {
        let kind = match err {
            EcgError::InsufficientData { .. } => FailureKind::InsufficientData,
            EcgError::InsufficientBeats { .. } => FailureKind::InsufficientBeats,
            _ => return None,
        };
        Some(Self {
            kind,
            message: err.to_string(),
        })
    }
}
