//! Record validation: raw CSV rows in, typed readings and rejects out.
//!
//! Validation runs in two phases. Batch-level checks (required columns, a
//! parseable timestamp column) fail the whole file with a
//! [`StructuralError`]. Row-level checks never fail the call; a row that
//! breaks any rule is returned as a [`RejectedRecord`] with its cells intact.

use chrono::{DateTime, Utc};
use sensor_core::error::StructuralError;
use sensor_core::models::{
    is_null_cell, Metric, RawBatch, RawRecord, RejectReason, RejectedRecord, ValidatedRecord,
};

/// Partition of one batch into persisted and quarantined rows.
#[derive(Debug, Clone, Default)]
pub struct Validation {
    /// Header row of the source file, for writing quarantine output.
    pub headers: Vec<String>,
    pub valid: Vec<ValidatedRecord>,
    pub invalid: Vec<RejectedRecord>,
}

/// Column positions resolved once per batch.
struct Columns {
    timestamp: usize,
    device: usize,
    light: usize,
    motion: usize,
    metrics: [(Metric, usize); 5],
}

impl Columns {
    fn resolve(batch: &RawBatch) -> Result<Self, StructuralError> {
        let missing = batch.missing_columns();
        if !missing.is_empty() {
            return Err(StructuralError::MissingColumns(missing));
        }

        let index = |name: &str| {
            batch
                .column_index(name)
                .ok_or_else(|| StructuralError::MissingColumns(vec![name.to_string()]))
        };

        let timestamp = batch
            .timestamp_index()
            .ok_or_else(|| StructuralError::MissingColumns(vec!["ts".to_string()]))?;

        let mut metrics = [(Metric::Co, 0); 5];
        for (slot, metric) in metrics.iter_mut().zip(Metric::ALL) {
            *slot = (metric, index(metric.as_str())?);
        }

        Ok(Columns {
            timestamp,
            device: index("device")?,
            light: index("light")?,
            motion: index("motion")?,
            metrics,
        })
    }
}

/// Validate every row of `batch`, tagging valid readings with `source_file`.
///
/// Returns `Err` only for batch-level structural problems; in that case no
/// row is classified at all and the caller must treat the file as failed.
pub fn validate(batch: RawBatch, source_file: &str) -> Result<Validation, StructuralError> {
    let columns = Columns::resolve(&batch)?;

    // The timestamp column must coerce as a whole before any row is judged.
    let timestamps = batch
        .rows
        .iter()
        .map(|row| parse_timestamp(row, columns.timestamp))
        .collect::<Result<Vec<_>, _>>()?;

    let mut valid = Vec::new();
    let mut invalid = Vec::new();

    for (row, timestamp) in batch.rows.into_iter().zip(timestamps) {
        match check_row(&row, timestamp, &columns, source_file) {
            Ok(record) => valid.push(record),
            Err(reasons) => invalid.push(RejectedRecord {
                record: row,
                reasons,
            }),
        }
    }

    Ok(Validation {
        headers: batch.headers,
        valid,
        invalid,
    })
}

// ── Coercion ──────────────────────────────────────────────────────────────────

/// Epoch seconds → UTC instant. Null cells yield `Ok(None)`.
fn parse_timestamp(
    row: &RawRecord,
    idx: usize,
) -> Result<Option<DateTime<Utc>>, StructuralError> {
    let cell = cell(row, idx);
    if is_null_cell(cell) {
        return Ok(None);
    }

    let seconds: f64 = cell
        .trim()
        .parse()
        .ok()
        .filter(|v: &f64| v.is_finite())
        .ok_or_else(|| StructuralError::UnparsableTimestamp {
            line: row.line,
            value: cell.to_string(),
        })?;

    epoch_to_datetime(seconds)
        .map(Some)
        .ok_or_else(|| StructuralError::TimestampOutOfRange {
            line: row.line,
            value: cell.to_string(),
        })
}

/// Convert fractional epoch seconds, keeping microsecond precision.
pub fn epoch_to_datetime(seconds: f64) -> Option<DateTime<Utc>> {
    let micros = (seconds * 1_000_000.0).round();
    if !micros.is_finite() || micros.abs() >= i64::MAX as f64 {
        return None;
    }
    DateTime::<Utc>::from_timestamp_micros(micros as i64)
}

/// Best-effort float coercion; unparsable or non-finite values are missing.
pub fn parse_metric(cell: &str) -> Option<f64> {
    if is_null_cell(cell) {
        return None;
    }
    cell.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Lenient boolean coercion for `light` / `motion`.
pub fn parse_flag(cell: &str) -> Option<bool> {
    match cell.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "1.0" => Some(true),
        "false" | "0" | "no" | "0.0" => Some(false),
        _ => None,
    }
}

fn cell(row: &RawRecord, idx: usize) -> &str {
    row.values.get(idx).map(String::as_str).unwrap_or("")
}

// ── Row predicate ─────────────────────────────────────────────────────────────

fn check_row(
    row: &RawRecord,
    timestamp: Option<DateTime<Utc>>,
    columns: &Columns,
    source_file: &str,
) -> Result<ValidatedRecord, Vec<RejectReason>> {
    let mut reasons = Vec::new();

    if timestamp.is_none() {
        reasons.push(RejectReason::MissingTimestamp);
    }

    let device = cell(row, columns.device);
    if is_null_cell(device) {
        reasons.push(RejectReason::MissingDevice);
    }

    let mut values = [0.0_f64; 5];
    for (slot, (metric, idx)) in values.iter_mut().zip(columns.metrics) {
        match parse_metric(cell(row, idx)) {
            Some(v) if metric.accepts(v) => *slot = v,
            Some(_) => reasons.push(RejectReason::OutOfRange(metric)),
            None => reasons.push(RejectReason::MissingMetric(metric)),
        }
    }

    let Some(timestamp) = timestamp else {
        return Err(reasons);
    };
    if !reasons.is_empty() {
        return Err(reasons);
    }

    let [co, humidity, lpg, smoke, temp] = values;
    Ok(ValidatedRecord {
        timestamp,
        device: device.to_string(),
        co,
        humidity,
        lpg,
        smoke,
        temp,
        light: parse_flag(cell(row, columns.light)),
        motion: parse_flag(cell(row, columns.motion)),
        source_file: source_file.to_string(),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use sensor_core::models::REQUIRED_COLUMNS;

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn headers() -> Vec<String> {
        REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect()
    }

    /// Build a row in `REQUIRED_COLUMNS` order.
    fn row(line: u64, cells: [&str; 9]) -> RawRecord {
        RawRecord {
            line,
            values: cells.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn good(line: u64, device: &str, temp: &str) -> RawRecord {
        row(
            line,
            [
                "1700000000.5",
                device,
                "0.004",
                "55.2",
                "True",
                "0.007",
                "False",
                "0.02",
                temp,
            ],
        )
    }

    fn batch(rows: Vec<RawRecord>) -> RawBatch {
        RawBatch {
            headers: headers(),
            rows,
        }
    }

    // ── Structural checks ─────────────────────────────────────────────────────

    #[test]
    fn test_missing_column_fails_whole_batch() {
        let mut b = batch(vec![good(2, "X", "20")]);
        b.headers[8] = "temperature".to_string();

        let err = validate(b, "f.csv").unwrap_err();
        assert_eq!(err, StructuralError::MissingColumns(vec!["temp".to_string()]));
    }

    #[test]
    fn test_missing_columns_on_empty_header() {
        let err = validate(RawBatch::default(), "empty.csv").unwrap_err();
        match err {
            StructuralError::MissingColumns(cols) => assert_eq!(cols.len(), 9),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_numeric_timestamp_fails_whole_batch() {
        let mut bad = good(3, "X", "20");
        bad.values[0] = "yesterday".to_string();
        let b = batch(vec![good(2, "X", "20"), bad]);

        let err = validate(b, "f.csv").unwrap_err();
        assert_eq!(
            err,
            StructuralError::UnparsableTimestamp {
                line: 3,
                value: "yesterday".to_string()
            }
        );
    }

    #[test]
    fn test_out_of_range_timestamp_fails_whole_batch() {
        let mut bad = good(2, "X", "20");
        bad.values[0] = "1e300".to_string();

        let err = validate(batch(vec![bad]), "f.csv").unwrap_err();
        assert!(matches!(err, StructuralError::TimestampOutOfRange { .. }));
    }

    #[test]
    fn test_header_only_batch_is_empty_not_failed() {
        let v = validate(batch(vec![]), "f.csv").unwrap();
        assert!(v.valid.is_empty());
        assert!(v.invalid.is_empty());
        assert_eq!(v.headers, headers());
    }

    #[test]
    fn test_extra_and_reordered_columns_are_accepted() {
        let b = RawBatch {
            headers: vec![
                "temp", "note", "device", "timestamp", "co", "humidity", "light", "lpg",
                "motion", "smoke",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            rows: vec![RawRecord {
                line: 2,
                values: vec![
                    "21", "calibrated", "X", "1700000000", "0.1", "40", "0", "0.2", "1", "0.3",
                ]
                .into_iter()
                .map(String::from)
                .collect(),
            }],
        };

        let v = validate(b, "f.csv").unwrap();
        assert_eq!(v.valid.len(), 1);
        let r = &v.valid[0];
        assert_eq!(r.temp, 21.0);
        assert_eq!(r.device, "X");
        assert_eq!(r.light, Some(false));
        assert_eq!(r.motion, Some(true));
    }

    // ── Row checks ────────────────────────────────────────────────────────────

    #[test]
    fn test_valid_row_is_coerced_and_tagged() {
        let v = validate(batch(vec![good(2, "b8:27:eb:bf:9d:51", "22.5")]), "iot_1.csv").unwrap();
        assert_eq!(v.valid.len(), 1);
        assert!(v.invalid.is_empty());

        let r = &v.valid[0];
        assert_eq!(r.timestamp.timestamp(), 1_700_000_000);
        assert_eq!(r.timestamp.timestamp_subsec_millis(), 500);
        assert_eq!(r.device, "b8:27:eb:bf:9d:51");
        assert_eq!(r.temp, 22.5);
        assert_eq!(r.humidity, 55.2);
        assert_eq!(r.co, 0.004);
        assert_eq!(r.lpg, 0.007);
        assert_eq!(r.smoke, 0.02);
        assert_eq!(r.light, Some(true));
        assert_eq!(r.motion, Some(false));
        assert_eq!(r.source_file, "iot_1.csv");
    }

    #[test]
    fn test_out_of_range_temp_keeps_original_value() {
        let v = validate(batch(vec![good(2, "X", "100"), good(3, "X", "-50.5")]), "f.csv").unwrap();
        assert!(v.valid.is_empty());
        assert_eq!(v.invalid.len(), 2);
        assert_eq!(v.invalid[0].record.values[8], "100");
        assert_eq!(v.invalid[0].reasons, vec![RejectReason::OutOfRange(Metric::Temp)]);
        assert_eq!(v.invalid[1].record.values[8], "-50.5");
    }

    #[test]
    fn test_range_bounds_are_inclusive() {
        let mut edge = good(2, "X", "-50");
        edge.values[3] = "100".to_string();
        edge.values[2] = "0".to_string();
        let v = validate(batch(vec![edge, good(3, "X", "50")]), "f.csv").unwrap();
        assert_eq!(v.valid.len(), 2);
    }

    #[test]
    fn test_humidity_out_of_range() {
        let mut r = good(2, "X", "20");
        r.values[3] = "100.1".to_string();
        let v = validate(batch(vec![r]), "f.csv").unwrap();
        assert_eq!(v.invalid[0].reasons, vec![RejectReason::OutOfRange(Metric::Humidity)]);
    }

    #[test]
    fn test_negative_gas_readings_rejected() {
        let mut r = good(2, "X", "20");
        r.values[2] = "-0.1".to_string();
        r.values[5] = "-1".to_string();
        r.values[7] = "-2".to_string();
        let v = validate(batch(vec![r]), "f.csv").unwrap();
        assert_eq!(
            v.invalid[0].reasons,
            vec![
                RejectReason::OutOfRange(Metric::Co),
                RejectReason::OutOfRange(Metric::Lpg),
                RejectReason::OutOfRange(Metric::Smoke),
            ]
        );
    }

    #[test]
    fn test_unparsable_metric_becomes_missing_not_fatal() {
        let mut r = good(2, "X", "20");
        r.values[5] = "n/a".to_string();
        let mut s = good(3, "X", "warm");
        s.values[3] = "".to_string();
        let v = validate(batch(vec![r, s, good(4, "X", "20")]), "f.csv").unwrap();

        assert_eq!(v.valid.len(), 1);
        assert_eq!(v.invalid.len(), 2);
        assert_eq!(v.invalid[0].reasons, vec![RejectReason::MissingMetric(Metric::Lpg)]);
        assert_eq!(
            v.invalid[1].reasons,
            vec![
                RejectReason::MissingMetric(Metric::Humidity),
                RejectReason::MissingMetric(Metric::Temp),
            ]
        );
        assert_eq!(v.invalid[1].record.values[8], "warm");
    }

    #[test]
    fn test_null_timestamp_is_row_level() {
        let mut r = good(2, "X", "20");
        r.values[0] = "".to_string();
        let v = validate(batch(vec![r, good(3, "X", "20")]), "f.csv").unwrap();
        assert_eq!(v.valid.len(), 1);
        assert_eq!(v.invalid[0].reasons, vec![RejectReason::MissingTimestamp]);
    }

    #[test]
    fn test_null_device_rejected() {
        let v = validate(batch(vec![good(2, "", "20"), good(3, "NaN", "20")]), "f.csv").unwrap();
        assert!(v.valid.is_empty());
        for rejected in &v.invalid {
            assert_eq!(rejected.reasons, vec![RejectReason::MissingDevice]);
        }
    }

    #[test]
    fn test_infinite_metric_treated_as_missing() {
        let v = validate(batch(vec![good(2, "X", "inf")]), "f.csv").unwrap();
        assert_eq!(v.invalid[0].reasons, vec![RejectReason::MissingMetric(Metric::Temp)]);
    }

    #[test]
    fn test_flags_do_not_affect_validity() {
        let mut r = good(2, "X", "20");
        r.values[4] = "maybe".to_string();
        r.values[6] = "".to_string();
        let v = validate(batch(vec![r]), "f.csv").unwrap();
        assert_eq!(v.valid.len(), 1);
        assert_eq!(v.valid[0].light, None);
        assert_eq!(v.valid[0].motion, None);
    }

    #[test]
    fn test_valid_rows_never_carry_missing_metrics() {
        let rows = vec![
            good(2, "A", "10"),
            good(3, "A", "abc"),
            good(4, "B", "49.9"),
            good(5, "", "1"),
        ];
        let v = validate(batch(rows), "f.csv").unwrap();
        for r in &v.valid {
            for metric in Metric::ALL {
                let value = metric.value_of(r);
                assert!(value.is_finite());
                assert!(metric.accepts(value));
            }
        }
        assert_eq!(v.valid.len() + v.invalid.len(), 4);
    }

    // ── Coercion helpers ──────────────────────────────────────────────────────

    #[test]
    fn test_epoch_to_datetime() {
        let dt = epoch_to_datetime(0.0).unwrap();
        assert_eq!(dt.to_rfc3339(), "1970-01-01T00:00:00+00:00");
        assert!(epoch_to_datetime(1e300).is_none());
        assert!(epoch_to_datetime(-1.5).is_some());
    }

    #[test]
    fn test_parse_metric() {
        assert_eq!(parse_metric(" 1.5 "), Some(1.5));
        assert_eq!(parse_metric("1e-3"), Some(0.001));
        assert_eq!(parse_metric("NaN"), None);
        assert_eq!(parse_metric("abc"), None);
        assert_eq!(parse_metric("-inf"), None);
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("True"), Some(true));
        assert_eq!(parse_flag("FALSE"), Some(false));
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag(""), None);
    }
}
