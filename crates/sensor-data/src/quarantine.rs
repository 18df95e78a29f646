//! Writer for rows that failed validation.
//!
//! Each routed source file gets one quarantine file, `invalid_<filename>`,
//! holding the original header and the rejected rows exactly as read.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sensor_core::error::{PipelineError, Result};
use sensor_core::models::RejectedRecord;

use crate::naming::suffixed_name;

const QUARANTINE_PREFIX: &str = "invalid_";

/// Deterministic quarantine location for `source_file` inside `dir`.
pub fn quarantine_path(dir: &Path, source_file: &str) -> PathBuf {
    dir.join(format!("{QUARANTINE_PREFIX}{source_file}"))
}

/// Write `rejected` under `dir` and return the final path.
///
/// The file is written to a hidden sibling and renamed into place, so
/// readers of the quarantine directory never see a partial file. A retry
/// that produces the same rows reuses [`quarantine_path`]; if that path holds
/// different rows (a reused source name), the new file is suffixed with
/// `discovered_at` instead.
pub fn write_quarantine(
    dir: &Path,
    source_file: &str,
    headers: &[String],
    rejected: &[RejectedRecord],
    discovered_at: DateTime<Utc>,
) -> Result<PathBuf> {
    let name = format!("{QUARANTINE_PREFIX}{source_file}");
    let tmp = dir.join(format!(".{name}.tmp"));
    let mut target = quarantine_path(dir, source_file);

    let to_err = |path: &Path, source: std::io::Error| PipelineError::Quarantine {
        path: path.to_path_buf(),
        source,
    };

    if let Err(e) = write_rows(&tmp, headers, rejected) {
        let _ = std::fs::remove_file(&tmp);
        return Err(to_err(&target, e));
    }

    if target.exists() && !same_contents(&tmp, &target) {
        target = dir.join(suffixed_name(&name, discovered_at.timestamp_millis()));
    }

    if let Err(e) = std::fs::rename(&tmp, &target) {
        let _ = std::fs::remove_file(&tmp);
        return Err(to_err(&target, e));
    }

    Ok(target)
}

fn same_contents(a: &Path, b: &Path) -> bool {
    match (std::fs::read(a), std::fs::read(b)) {
        (Ok(x), Ok(y)) => x == y,
        _ => false,
    }
}

fn write_rows(path: &Path, headers: &[String], rejected: &[RejectedRecord]) -> std::io::Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(std::io::Error::from)?;
    writer.write_record(headers).map_err(std::io::Error::from)?;
    for row in rejected {
        writer
            .write_record(&row.record.values)
            .map_err(std::io::Error::from)?;
    }
    writer.flush()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
