//! One-value-per-line text files: single-lead samples, R-peak indices, RR intervals.

use crate::signal::{Events, RRSeries};
use anyhow::{Context, Result};
use std::{fmt::Display, path::Path, str::FromStr};

fn parse_lines<T>(text: &str, what: &str) -> Result<Vec<T>>
where
    T: FromStr,
    T::Err: Display,
{
    let values = text
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(idx, line)| {
            line.parse::<T>()
                .map_err(|e| anyhow::anyhow!("line {}: {line:?} is not {what} ({e})", idx + 1))
        })
        .collect::<Result<Vec<T>>>()?;
    if values.is_empty() {
        anyhow::bail!("no {what} values found");
    }
    Ok(values)
}

fn read_lines<T>(path: &Path, what: &str) -> Result<Vec<T>>
where
    T: FromStr,
    T::Err: Display,
{
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_lines(&text, what).with_context(|| format!("failed to parse {}", path.display()))
}

pub fn parse_f64_series(text: &str) -> Result<Vec<f64>> {
    parse_lines(text, "a number")
}

/// Sample indices; order is normalised so the result is a valid `Events`.
pub fn read_events(path: &Path) -> Result<Events> {
    let mut indices: Vec<usize> = read_lines(path, "a sample index")?;
    indices.sort_unstable();
    indices.dedup();
    Ok(Events::from_indices(indices))
}

/// RR intervals in milliseconds.
pub fn read_rr_series(path: &Path) -> Result<RRSeries> {
    let rr: Vec<f64> = read_lines(path, "an RR interval")?;
    if let Some(bad) = rr.iter().find(|v| !(v.is_finite() && **v > 0.0)) {
        anyhow::bail!("RR intervals must be positive, found {bad}");
    }
    Ok(RRSeries { rr })
}
