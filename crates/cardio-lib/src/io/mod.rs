//! Recording sources. These adapters sit outside the analysis core: they
//! only turn files into `Recording`s and optional reference annotations.

pub mod delimited;
pub mod edf;
pub mod text;
pub mod wfdb;

use anyhow::{Context, Result};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Extensions picked up by [`find_record_file`], compared case-insensitively.
pub const RECORD_EXTENSIONS: &[&str] = &["dat", "hea", "edf", "csv", "txt"];

/// On-disk layout of a record file, decided from its extension and siblings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordSource {
    /// WFDB record, given by its `.hea` header.
    Wfdb(PathBuf),
    Edf(PathBuf),
    Delimited(PathBuf),
}

impl RecordSource {
    pub fn classify(path: &Path) -> Self {
        let ext = extension(path);
        let header = path.with_extension("hea");
        if ext == "hea" || ext == "dat" || header.is_file() {
            RecordSource::Wfdb(header)
        } else if ext == "edf" {
            RecordSource::Edf(path.to_path_buf())
        } else {
            RecordSource::Delimited(path.to_path_buf())
        }
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

/// Most recently modified record file directly inside `dir`; ties go to the
/// lexicographically last name.
pub fn find_record_file(dir: &Path) -> Result<PathBuf> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))?;
    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to list {}", dir.display()))?;
        let path = entry.path();
        if !path.is_file() || !RECORD_EXTENSIONS.contains(&extension(&path).as_str()) {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .with_context(|| format!("no modification time for {}", path.display()))?;
        let candidate = (modified, path);
        if newest.as_ref().map_or(true, |best| candidate > *best) {
            newest = Some(candidate);
        }
    }
    let (_, path) = newest.with_context(|| {
        format!(
            "no record files ({}) found in {}",
            RECORD_EXTENSIONS.join(", "),
            dir.display()
        )
    })?;
    info!("using newest record file {}", path.display());
    Ok(path)
}
