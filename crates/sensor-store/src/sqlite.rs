//! SQLite-backed [`Sink`].
//!
//! Two relations are created on open if absent:
//! - `iot_raw_data`: one row per validated reading
//! - `sensor_aggregates`: one row per (file, device, metric)
//!
//! Timestamps are stored as RFC 3339 text in UTC.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::SecondsFormat;
use rusqlite::{params, Connection};
use sensor_core::error::SinkError;
use sensor_core::models::{AggregateRow, ValidatedRecord};
use sensor_core::settings::WriteMode;
use tracing::{debug, info};

use crate::sink::Sink;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS iot_raw_data (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    device TEXT NOT NULL,
    co REAL NOT NULL,
    humidity REAL NOT NULL,
    light INTEGER,
    lpg REAL NOT NULL,
    motion INTEGER,
    smoke REAL NOT NULL,
    temp REAL NOT NULL,
    source_file TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_raw_device_timestamp ON iot_raw_data(device, timestamp);

CREATE TABLE IF NOT EXISTS sensor_aggregates (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    device TEXT NOT NULL,
    sensor_type TEXT NOT NULL,
    min_value REAL NOT NULL,
    max_value REAL NOT NULL,
    avg_value REAL NOT NULL,
    std_dev_value REAL,
    metric_window_start TEXT NOT NULL,
    source_file TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_agg_device_type ON sensor_aggregates(device, sensor_type);
";

pub struct SqliteSink {
    conn: Mutex<Connection>,
    mode: WriteMode,
}

impl SqliteSink {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub fn open(path: &Path, mode: WriteMode) -> Result<Self, SinkError> {
        let conn = Connection::open(path).map_err(db)?;
        conn.pragma_update(None, "journal_mode", "WAL").map_err(db)?;
        conn.pragma_update(None, "synchronous", "NORMAL").map_err(db)?;
        let sink = Self::with_connection(conn, mode)?;
        info!(
            "SQLite sink ready at {} (write mode: {})",
            path.display(),
            mode.as_str()
        );
        Ok(sink)
    }

    /// Private in-memory database, mainly for tests.
    pub fn open_in_memory(mode: WriteMode) -> Result<Self, SinkError> {
        let conn = Connection::open_in_memory().map_err(db)?;
        Self::with_connection(conn, mode)
    }

    fn with_connection(conn: Connection, mode: WriteMode) -> Result<Self, SinkError> {
        conn.execute_batch(SCHEMA).map_err(db)?;
        Ok(Self {
            conn: Mutex::new(conn),
            mode,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SinkError> {
        self.conn.lock().map_err(|_| SinkError::Poisoned)
    }
}

impl Sink for SqliteSink {
    fn append_raw(&self, records: &[ValidatedRecord]) -> Result<usize, SinkError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db)?;
        let n = insert_raw(&tx, records)?;
        tx.commit().map_err(db)?;
        debug!("Appended {} raw rows", n);
        Ok(n)
    }

    fn append_aggregates(&self, rows: &[AggregateRow]) -> Result<usize, SinkError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db)?;
        let n = insert_aggregates(&tx, rows)?;
        tx.commit().map_err(db)?;
        debug!("Appended {} aggregate rows", n);
        Ok(n)
    }

    fn append_file(
        &self,
        records: &[ValidatedRecord],
        aggregates: &[AggregateRow],
    ) -> Result<(), SinkError> {
        if self.mode == WriteMode::Split {
            self.append_raw(records)?;
            self.append_aggregates(aggregates)?;
            return Ok(());
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db)?;
        let raw = insert_raw(&tx, records)?;
        let aggs = insert_aggregates(&tx, aggregates)?;
        tx.commit().map_err(db)?;
        debug!("Appended {} raw rows and {} aggregate rows", raw, aggs);
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "SQLite"
    }
}

// ── Statements ────────────────────────────────────────────────────────────────

fn insert_raw(conn: &Connection, records: &[ValidatedRecord]) -> Result<usize, SinkError> {
    let mut stmt = conn
        .prepare_cached(
            "INSERT INTO iot_raw_data
             (timestamp, device, co, humidity, light, lpg, motion, smoke, temp, source_file)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .map_err(db)?;

    for r in records {
        stmt.execute(params![
            r.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            r.device,
            r.co,
            r.humidity,
            r.light,
            r.lpg,
            r.motion,
            r.smoke,
            r.temp,
            r.source_file,
        ])
        .map_err(db)?;
    }
    Ok(records.len())
}

fn insert_aggregates(conn: &Connection, rows: &[AggregateRow]) -> Result<usize, SinkError> {
    let mut stmt = conn
        .prepare_cached(
            "INSERT INTO sensor_aggregates
             (device, sensor_type, min_value, max_value, avg_value, std_dev_value,
              metric_window_start, source_file)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .map_err(db)?;

    for a in rows {
        stmt.execute(params![
            a.device,
            a.sensor_type.as_str(),
            a.min_value,
            a.max_value,
            a.avg_value,
            a.std_dev_value,
            a.metric_window_start
                .to_rfc3339_opts(SecondsFormat::AutoSi, true),
            a.source_file,
        ])
        .map_err(db)?;
    }
    Ok(rows.len())
}

fn db(e: rusqlite::Error) -> SinkError {
    SinkError::Database(e.to_string())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
