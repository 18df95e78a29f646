use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FailureKind;

/// Header name of the epoch-seconds column written by the upstream producer.
pub const TIMESTAMP_COLUMN: &str = "ts";

/// Accepted alternative spelling of [`TIMESTAMP_COLUMN`].
pub const TIMESTAMP_COLUMN_ALIAS: &str = "timestamp";

/// Every column an intake file must carry.
pub const REQUIRED_COLUMNS: [&str; 9] = [
    TIMESTAMP_COLUMN,
    "device",
    "co",
    "humidity",
    "light",
    "lpg",
    "motion",
    "smoke",
    "temp",
];

/// Cell values treated as missing, after trimming.
pub const NULL_TOKENS: [&str; 13] = [
    "", "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "-nan", "null", "NULL", "None", "<NA>", "#N/A",
];

/// Returns `true` when `cell` denotes a missing value.
pub fn is_null_cell(cell: &str) -> bool {
    NULL_TOKENS.contains(&cell.trim())
}

// ── Metric ────────────────────────────────────────────────────────────────────

/// One of the five numeric sensor channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Co,
    Humidity,
    Lpg,
    Smoke,
    Temp,
}

impl Metric {
    /// All metrics in aggregation order.
    pub const ALL: [Metric; 5] = [
        Metric::Co,
        Metric::Humidity,
        Metric::Lpg,
        Metric::Smoke,
        Metric::Temp,
    ];

    /// Column name in intake files and `sensor_type` value in the store.
    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Co => "co",
            Metric::Humidity => "humidity",
            Metric::Lpg => "lpg",
            Metric::Smoke => "smoke",
            Metric::Temp => "temp",
        }
    }

    /// Inclusive lower and upper bound a valid reading must fall in.
    pub fn valid_range(self) -> (f64, f64) {
        match self {
            Metric::Temp => (-50.0, 50.0),
            Metric::Humidity => (0.0, 100.0),
            Metric::Co | Metric::Lpg | Metric::Smoke => (0.0, f64::INFINITY),
        }
    }

    /// Returns `true` when `value` lies within [`Metric::valid_range`].
    pub fn accepts(self, value: f64) -> bool {
        let (lo, hi) = self.valid_range();
        value >= lo && value <= hi
    }

    /// Read this metric from a validated record.
    pub fn value_of(self, record: &ValidatedRecord) -> f64 {
        match self {
            Metric::Co => record.co,
            Metric::Humidity => record.humidity,
            Metric::Lpg => record.lpg,
            Metric::Smoke => record.smoke,
            Metric::Temp => record.temp,
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Raw input ─────────────────────────────────────────────────────────────────

/// One data row of an intake file, every cell kept verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// 1-based line number in the source file (header is line 1).
    pub line: u64,
    /// Cells in header order.
    pub values: Vec<String>,
}

/// The header and rows of a single intake file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawBatch {
    pub headers: Vec<String>,
    pub rows: Vec<RawRecord>,
}

impl RawBatch {
    /// Position of `name` in the header row.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Position of the timestamp column under either accepted name.
    pub fn timestamp_index(&self) -> Option<usize> {
        self.column_index(TIMESTAMP_COLUMN)
            .or_else(|| self.column_index(TIMESTAMP_COLUMN_ALIAS))
    }

    /// Required columns absent from the header row.
    pub fn missing_columns(&self) -> Vec<String> {
        REQUIRED_COLUMNS
            .iter()
            .filter(|name| {
                if **name == TIMESTAMP_COLUMN {
                    self.timestamp_index().is_none()
                } else {
                    self.column_index(name).is_none()
                }
            })
            .map(|name| name.to_string())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ── Validated / rejected ──────────────────────────────────────────────────────

/// A reading that passed type coercion and range checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedRecord {
    pub timestamp: DateTime<Utc>,
    pub device: String,
    pub co: f64,
    pub humidity: f64,
    pub lpg: f64,
    pub smoke: f64,
    pub temp: f64,
    pub light: Option<bool>,
    pub motion: Option<bool>,
    /// Name of the intake file this reading came from.
    pub source_file: String,
}

/// Why a row was sent to quarantine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    MissingTimestamp,
    MissingDevice,
    MissingMetric(Metric),
    OutOfRange(Metric),
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::MissingTimestamp => f.write_str("missing timestamp"),
            RejectReason::MissingDevice => f.write_str("missing device"),
            RejectReason::MissingMetric(m) => write!(f, "missing or non-numeric {m}"),
            RejectReason::OutOfRange(m) => write!(f, "{m} out of range"),
        }
    }
}

/// A row that failed validation, original cells untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRecord {
    pub record: RawRecord,
    pub reasons: Vec<RejectReason>,
}

// ── Aggregates ────────────────────────────────────────────────────────────────

/// Per-device summary of one metric over the valid rows of one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub device: String,
    pub sensor_type: Metric,
    pub min_value: f64,
    pub max_value: f64,
    pub avg_value: f64,
    /// Sample standard deviation; `None` for a single reading.
    pub std_dev_value: Option<f64>,
    /// Wall-clock time the aggregation ran.
    pub metric_window_start: DateTime<Utc>,
    pub source_file: String,
}

// ── Outcomes ──────────────────────────────────────────────────────────────────

/// Result of routing one intake file.
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    /// Every row was valid and the file is archived.
    Success { valid_rows: usize },
    /// Some rows were quarantined; the rest persisted and the file archived.
    QuarantinedPartial {
        valid_rows: usize,
        quarantined_rows: usize,
        quarantine_path: PathBuf,
    },
    /// The file was left in the watch directory.
    Failed { kind: FailureKind, reason: String },
}

impl FileOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, FileOutcome::Failed { .. })
    }

    /// Number of rows persisted to the store.
    pub fn valid_rows(&self) -> usize {
        match self {
            FileOutcome::Success { valid_rows }
            | FileOutcome::QuarantinedPartial { valid_rows, .. } => *valid_rows,
            FileOutcome::Failed { .. } => 0,
        }
    }
}
