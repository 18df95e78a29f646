use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File-level input problems that reprocessing the same bytes cannot fix.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StructuralError {
    /// One or more required columns are absent from the header row.
    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    /// A non-null timestamp cell is not a number of epoch seconds.
    #[error("Unparsable timestamp {value:?} on line {line}")]
    UnparsableTimestamp { line: u64, value: String },

    /// A timestamp is numeric but outside the representable date range.
    #[error("Timestamp {value:?} on line {line} is out of range")]
    TimestampOutOfRange { line: u64, value: String },

    /// The file is not well-formed tabular text.
    #[error("Malformed row on line {line}: {message}")]
    MalformedRow { line: u64, message: String },
}

/// Failures of the durable store.
#[derive(Error, Debug)]
pub enum SinkError {
    /// The underlying database rejected a statement or transaction.
    #[error("Database error: {0}")]
    Database(String),

    /// The connection guard was poisoned by a panicking writer.
    #[error("Sink connection poisoned")]
    Poisoned,
}

/// Category of a file-level failure, used for logging and dead-letter records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Missing columns, bad timestamp column, malformed rows.
    Structural,
    /// The durable store refused the append.
    SinkWrite,
    /// Processing exceeded the per-file time budget.
    Timeout,
    /// Anything else (I/O, archive, quarantine writes, panics).
    Unexpected,
}

impl FailureKind {
    /// Whether reprocessing the same bytes could succeed.
    pub fn is_retryable(self) -> bool {
        !matches!(self, FailureKind::Structural)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Structural => "structural",
            FailureKind::SinkWrite => "sink_write",
            FailureKind::Timeout => "timeout",
            FailureKind::Unexpected => "unexpected",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All errors produced while routing an intake file.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file failed a batch-level structural check.
    #[error("Structural input error: {0}")]
    Structural(#[from] StructuralError),

    /// Appending to the durable store failed.
    #[error("Sink write failed: {0}")]
    Sink(#[from] SinkError),

    /// Rejected rows could not be written to quarantine.
    #[error("Failed to write quarantine file {path}: {source}")]
    Quarantine {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The source file could not be moved into the archive.
    #[error("Failed to archive {from} to {to}: {source}")]
    Archive {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A failed file could not be moved to the dead-letter directory.
    #[error("Failed to dead-letter {path}: {source}")]
    DeadLetter {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Processing a file took longer than the configured budget.
    #[error("Processing timed out after {0:?}")]
    Timeout(Duration),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    /// Map this error onto the failure taxonomy.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            PipelineError::Structural(_) => FailureKind::Structural,
            PipelineError::Sink(_) => FailureKind::SinkWrite,
            PipelineError::Timeout(_) => FailureKind::Timeout,
            _ => FailureKind::Unexpected,
        }
    }
}

/// Convenience alias used throughout the pipeline crates.
pub type Result<T> = std::result::Result<T, PipelineError>;
