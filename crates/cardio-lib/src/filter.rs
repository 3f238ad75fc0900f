//! Butterworth band-pass design and zero-phase (forward-backward) application.
//!
//! The band is designed directly as second-order sections and applied with
//! `sosfiltfilt` over an odd extension of the signal, so filtered samples stay
//! aligned with the input.

use crate::{
    error::EcgError,
    signal::{check_fs, TimeSeries},
};
use log::debug;
use sci_rs::signal::filter::{
    design::{butter_dyn, DigitalFilter, FilterBandType, FilterOutputType, Sos, SosFormatFilter},
    sosfiltfilt_dyn,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Band-pass parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Butterworth order (>= 1); the band design has `order` sections.
    pub order: usize,
    /// Lower cutoff (Hz).
    pub lowcut_hz: f64,
    /// Upper cutoff (Hz), must stay below Nyquist.
    pub highcut_hz: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            order: 4,
            lowcut_hz: 0.5,
            highcut_hz: 45.0,
        }
    }
}

impl FilterConfig {
    pub fn validate(&self, fs: f64) -> Result<(), EcgError> {
        check_fs(fs)?;
        if self.order == 0 {
            return Err(EcgError::invalid("filter order must be at least 1"));
        }
        let nyquist = 0.5 * fs;
        let (low, high) = (self.lowcut_hz, self.highcut_hz);
        if !(low.is_finite() && high.is_finite() && 0.0 < low && low < high && high < nyquist) {
            return Err(EcgError::invalid(format!(
                "cutoffs must satisfy 0 < lowcut < highcut < fs/2 ({nyquist} Hz), got {low}..{high}"
            )));
        }
        Ok(())
    }

    /// Samples of odd extension padded on each side before filtering.
    /// The band design has one section per order, hence `3 * (2 * order + 1)`.
    pub fn transient_len(&self) -> usize {
        3 * (2 * self.order + 1)
    }
}

/// Designed Butterworth band-pass, ready to apply to any signal at its design rate.
#[derive(Clone)]
pub struct BandPass {
    cfg: FilterConfig,
    sos: Vec<Sos<f64>>,
    padlen: usize,
}

impl fmt::Debug for BandPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BandPass")
            .field("cfg", &self.cfg)
            .field("sections", &self.sos.len())
            .field("padlen", &self.padlen)
            .finish()
    }
}

impl BandPass {
    pub fn butterworth(cfg: &FilterConfig, fs: f64) -> Result<Self, EcgError> {
        cfg.validate(fs)?;
        let design = butter_dyn(
            cfg.order,
            vec![cfg.lowcut_hz, cfg.highcut_hz],
            Some(FilterBandType::Bandpass),
            Some(false),
            Some(FilterOutputType::Sos),
            Some(fs),
        );
        let DigitalFilter::Sos(SosFormatFilter { sos }) = design else {
            return Err(EcgError::Spectral(
                "band-pass design did not yield second-order sections".into(),
            ));
        };
        if sos.is_empty() {
            return Err(EcgError::Spectral("band-pass design is empty".into()));
        }
        // odd-extension length used by sosfiltfilt: 3 * ntaps
        let b_zeros = sos.iter().filter(|s| s.b[2] == 0.0).count();
        let a_zeros = sos.iter().filter(|s| s.a[2] == 0.0).count();
        let padlen = 3 * (2 * sos.len() + 1 - b_zeros.min(a_zeros));
        debug!(
            "designed band-pass order={} {}..{} Hz at fs={} ({} sections, pad {})",
            cfg.order,
            cfg.lowcut_hz,
            cfg.highcut_hz,
            fs,
            sos.len(),
            padlen
        );
        Ok(Self {
            cfg: *cfg,
            sos,
            padlen,
        })
    }

    /// Samples of odd extension padded on each side; shorter inputs are rejected.
    pub fn transient_len(&self) -> usize {
        self.padlen
    }

    /// Forward-backward filtering with steady-state initial conditions.
    pub fn filtfilt(&self, data: &[f64]) -> Result<Vec<f64>, EcgError> {
        let n = data.len();
        if n <= self.padlen {
            return Err(EcgError::InsufficientData {
                needed: self.padlen,
                got: n,
            });
        }
        Ok(sosfiltfilt_dyn(data.iter(), &self.sos))
    }
}

/// Band-limit one lead; output keeps the input's sampling frequency.
pub fn bandpass(ts: &TimeSeries, cfg: &FilterConfig) -> Result<TimeSeries, EcgError> {
    let design = BandPass::butterworth(cfg, ts.fs)?;
    let data = design.filtfilt(&ts.data)?;
    Ok(TimeSeries { fs: ts.fs, data })
}

/// Positional form: `order`, `fs`, and the two cutoffs.
pub fn butterworth_filter(
    data: &[f64],
    order: usize,
    fs: f64,
    lowcut_hz: f64,
    highcut_hz: f64,
) -> Result<TimeSeries, EcgError> {
    let cfg = FilterConfig {
        order,
        lowcut_hz,
        highcut_hz,
    };
    bandpass(&TimeSeries::new(fs, data.to_vec()), &cfg)
}
