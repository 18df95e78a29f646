//! Dead-letter handling for files that keep failing.
//!
//! Failed attempts are counted per file name in memory. Once a file reaches
//! the configured limit it is moved out of the watch directory together with
//! a `<name>.error.json` record describing the last failure. A name that is
//! already taken in the dead-letter directory is suffixed with the failure
//! time, for the file and its record alike.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sensor_core::error::{FailureKind, PipelineError, Result};
use sensor_data::naming::suffixed_name;
use serde::{Deserialize, Serialize};

/// Record written next to a dead-lettered file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedFile {
    /// Original location of the file in the watch directory.
    pub path: String,
    /// Reason reported by the last failed attempt.
    pub error: String,
    pub kind: FailureKind,
    pub attempts: u32,
    pub dead_lettered_at: DateTime<Utc>,
}

/// Per-file failure counts for one running process.
#[derive(Debug, Default)]
pub struct AttemptTracker {
    max_attempts: u32,
    attempts: HashMap<String, u32>,
}

impl AttemptTracker {
    /// `max_attempts == 0` disables dead-lettering.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            attempts: HashMap::new(),
        }
    }

    /// Count one more failure for `file`, returning the new total.
    pub fn record_failure(&mut self, file: &str) -> u32 {
        let count = self.attempts.entry(file.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Forget `file`, after a success or a dead-letter move.
    pub fn clear(&mut self, file: &str) {
        self.attempts.remove(file);
    }

    pub fn is_exhausted(&self, attempts: u32) -> bool {
        self.max_attempts > 0 && attempts >= self.max_attempts
    }
}

/// Move `path` into `dir` and write its failure record beside it.
///
/// Returns the new location of the file.
pub fn move_to_dead_letter(path: &Path, dir: &Path, record: &FailedFile) -> Result<PathBuf> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".to_string());

    let err = |source: std::io::Error| PipelineError::DeadLetter {
        path: path.to_path_buf(),
        source,
    };

    let name = dead_letter_name(dir, &name, record.dead_lettered_at);
    let target = dir.join(&name);

    let json = serde_json::to_string_pretty(record).map_err(|e| err(e.into()))?;
    let record_path = dir.join(format!("{name}.error.json"));
    let tmp = dir.join(format!(".{name}.error.json.tmp"));
    std::fs::write(&tmp, json).map_err(err)?;
    std::fs::rename(&tmp, &record_path).map_err(err)?;

    if std::fs::rename(path, &target).is_err() {
        std::fs::copy(path, &target).map_err(err)?;
        std::fs::remove_file(path).map_err(err)?;
    }

    Ok(target)
}

/// `name`, or its suffixed form when the file or its record already exists.
fn dead_letter_name(dir: &Path, name: &str, at: DateTime<Utc>) -> String {
    let taken = dir.join(name).exists() || dir.join(format!("{name}.error.json")).exists();
    if taken {
        suffixed_name(name, at.timestamp_millis())
    } else {
        name.to_string()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
