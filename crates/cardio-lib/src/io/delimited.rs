//! Header-less multi-column text recordings (comma or whitespace separated).

use crate::signal::Recording;
use anyhow::{anyhow, Context, Result};
use csv::{ReaderBuilder, Trim};
use std::path::Path;

/// Parse columns as leads `lead1..leadN`, keeping at most `max_leads` columns.
pub fn parse_delimited_recording(text: &str, fs: f64, max_leads: Option<usize>) -> Result<Recording> {
    let comma = text
        .lines()
        .find(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'))
        .map(|l| l.contains(','))
        .unwrap_or(false);
    let rows = if comma {
        comma_rows(text)?
    } else {
        whitespace_rows(text)?
    };
    let width = rows
        .first()
        .map(Vec::len)
        .ok_or_else(|| anyhow!("no numeric rows found"))?;
    let leads = max_leads.map_or(width, |m| m.min(width));
    if leads == 0 {
        anyhow::bail!("recording must keep at least one lead");
    }
    let mut channels = vec![Vec::with_capacity(rows.len()); leads];
    for (row_idx, row) in rows.iter().enumerate() {
        if row.len() < leads {
            anyhow::bail!(
                "row {} has {} columns, expected at least {}",
                row_idx + 1,
                row.len(),
                leads
            );
        }
        for (channel, value) in channels.iter_mut().zip(row) {
            channel.push(*value);
        }
    }
    Ok(Recording::from_channels(fs, channels))
}

pub fn read_delimited_recording(path: &Path, fs: f64, max_leads: Option<usize>) -> Result<Recording> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_delimited_recording(&text, fs, max_leads)
        .with_context(|| format!("failed to parse {}", path.display()))
}

fn comma_rows(text: &str) -> Result<Vec<Vec<f64>>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .comment(Some(b'#'))
        .from_reader(text.as_bytes());
    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("reading row {}", idx + 1))?;
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }
        rows.push(parse_fields(record.iter(), idx)?);
    }
    Ok(rows)
}

fn whitespace_rows(text: &str) -> Result<Vec<Vec<f64>>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !trimmed.starts_with('#')
        })
        .map(|(idx, line)| parse_fields(line.split_whitespace(), idx))
        .collect()
}

fn parse_fields<'a>(fields: impl Iterator<Item = &'a str>, row_idx: usize) -> Result<Vec<f64>> {
    fields
        .filter(|f| !f.is_empty())
        .map(|f| {
            f.parse::<f64>()
                .with_context(|| format!("row {} field {:?} is not numeric", row_idx + 1, f))
        })
        .collect()
}
