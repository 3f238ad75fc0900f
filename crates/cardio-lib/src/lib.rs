//! ECG analysis core: band-pass filtering, R-peak detection, HRV statistics
//! and fixed-window arrhythmia classification, orchestrated per lead.

pub mod classify;
pub mod detectors;
pub mod error;
pub mod filter;
pub mod io;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod signal;

#[cfg(test)]
mod fixtures;
