//! Per-device metric summaries over the valid rows of one intake file.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sensor_core::models::{AggregateRow, Metric, ValidatedRecord};
use sensor_core::stats::Accumulator;

/// Stateless helper that groups validated readings by device.
pub struct MetricAggregator;

impl MetricAggregator {
    /// One [`AggregateRow`] per (device, metric) pair present in `rows`.
    ///
    /// Rows are emitted ordered by metric (`co, humidity, lpg, smoke, temp`)
    /// and then by device name.
    pub fn aggregate(
        rows: &[ValidatedRecord],
        source_file: &str,
        window_start: DateTime<Utc>,
    ) -> Vec<AggregateRow> {
        let groups = Self::group_by_device(rows);

        let mut out = Vec::with_capacity(groups.len() * Metric::ALL.len());
        for metric in Metric::ALL {
            for (device, members) in &groups {
                let mut acc = Accumulator::default();
                for record in members {
                    acc.push(metric.value_of(record));
                }
                let Some(stats) = acc.finish() else {
                    continue;
                };
                out.push(AggregateRow {
                    device: (*device).to_string(),
                    sensor_type: metric,
                    min_value: stats.min,
                    max_value: stats.max,
                    avg_value: stats.mean,
                    std_dev_value: stats.std_dev,
                    metric_window_start: window_start,
                    source_file: source_file.to_string(),
                });
            }
        }
        out
    }

    /// Device name → readings, with keys in sorted order.
    fn group_by_device(rows: &[ValidatedRecord]) -> BTreeMap<&str, Vec<&ValidatedRecord>> {
        let mut map: BTreeMap<&str, Vec<&ValidatedRecord>> = BTreeMap::new();
        for record in rows {
            map.entry(record.device.as_str()).or_default().push(record);
        }
        map
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
