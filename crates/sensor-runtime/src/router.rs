//! Per-file routing: read, validate, quarantine, persist, archive.
//!
//! [`FileRouter::process_file`] is the unit of failure isolation. Every error
//! raised while handling one file is logged and folded into a
//! [`FileOutcome::Failed`]; nothing propagates to the intake loop.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sensor_core::error::{PipelineError, Result};
use sensor_core::models::FileOutcome;
use sensor_core::settings::PipelineConfig;
use sensor_data::aggregator::MetricAggregator;
use sensor_data::naming::vacant_path;
use sensor_data::quarantine::write_quarantine;
use sensor_data::reader::{read_intake_file, source_file_name};
use sensor_data::validator::{validate, Validation};
use sensor_store::Sink;
use tracing::{debug, error, info, warn};

pub struct FileRouter {
    config: Arc<PipelineConfig>,
    sink: Arc<dyn Sink>,
}

impl FileRouter {
    pub fn new(config: Arc<PipelineConfig>, sink: Arc<dyn Sink>) -> Self {
        Self { config, sink }
    }

    /// Route one intake file, treating "now" as its discovery time.
    pub fn process_file(&self, path: &Path) -> FileOutcome {
        self.process_discovered(path, Utc::now())
    }

    /// Route one intake file discovered at `discovered_at`.
    ///
    /// The discovery time only matters when the archive or quarantine already
    /// holds a different file under the same name; the new entry is then
    /// suffixed with it.
    pub fn process_discovered(&self, path: &Path, discovered_at: DateTime<Utc>) -> FileOutcome {
        let file = source_file_name(path);
        info!(file = %file, "Processing file");

        match self.route(path, &file, discovered_at) {
            Ok(outcome) => outcome,
            Err(e) => {
                let kind = e.failure_kind();
                error!(file = %file, kind = %kind, error = %e, "File processing failed");
                FileOutcome::Failed {
                    kind,
                    reason: e.to_string(),
                }
            }
        }
    }

    fn route(&self, path: &Path, file: &str, discovered_at: DateTime<Utc>) -> Result<FileOutcome> {
        let batch = read_intake_file(path)?;
        let Validation {
            headers,
            valid,
            invalid,
        } = validate(batch, file)?;

        let quarantine_path = if invalid.is_empty() {
            None
        } else {
            for rejected in &invalid {
                let reasons: Vec<String> = rejected.reasons.iter().map(|r| r.to_string()).collect();
                debug!(file = %file, line = rejected.record.line, reasons = ?reasons, "Row rejected");
            }
            let qpath = write_quarantine(
                &self.config.quarantine_dir,
                file,
                &headers,
                &invalid,
                discovered_at,
            )?;
            warn!(
                file = %file,
                quarantined = invalid.len(),
                path = %qpath.display(),
                "Quarantined invalid rows"
            );
            Some(qpath)
        };

        if !valid.is_empty() {
            let aggregates = MetricAggregator::aggregate(&valid, file, Utc::now());
            self.sink.append_file(&valid, &aggregates)?;
            debug!(
                file = %file,
                rows = valid.len(),
                aggregates = aggregates.len(),
                sink = self.sink.backend_type(),
                "Persisted valid rows"
            );
        }

        let archived = archive_file(path, &self.config.archive_dir, file, discovered_at)?;
        info!(
            file = %file,
            rows = valid.len(),
            quarantined = invalid.len(),
            archived = %archived.display(),
            "File processed"
        );

        Ok(match quarantine_path {
            Some(quarantine_path) => FileOutcome::QuarantinedPartial {
                valid_rows: valid.len(),
                quarantined_rows: invalid.len(),
                quarantine_path,
            },
            None => FileOutcome::Success {
                valid_rows: valid.len(),
            },
        })
    }
}

// ── Archive ───────────────────────────────────────────────────────────────────

/// Move `path` into `archive_dir`, keeping its name unless that is taken.
///
/// On a name clash the archived copy becomes `<stem>.<unix_millis>.<ext>`
/// using `discovered_at`.
pub fn archive_file(
    path: &Path,
    archive_dir: &Path,
    file: &str,
    discovered_at: DateTime<Utc>,
) -> Result<PathBuf> {
    let target = vacant_path(archive_dir, file, discovered_at);

    if let Err(e) = std::fs::rename(path, &target) {
        debug!(file = %file, error = %e, "Rename into archive failed; copying instead");
        copy_into_place(path, &target).map_err(|source| PipelineError::Archive {
            from: path.to_path_buf(),
            to: target.clone(),
            source,
        })?;
    }

    Ok(target)
}

/// Copy to a hidden sibling of `to`, rename it into place, then drop `from`.
fn copy_into_place(from: &Path, to: &Path) -> std::io::Result<()> {
    let name = to
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = to.with_file_name(format!(".{name}.tmp"));

    std::fs::copy(from, &tmp)?;
    if let Err(e) = std::fs::rename(&tmp, to) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    std::fs::remove_file(from)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
