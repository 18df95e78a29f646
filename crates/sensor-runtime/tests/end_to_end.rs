//! Full pipeline runs against a real SQLite file.

use std::path::Path;
use std::sync::Arc;

use rusqlite::Connection;
use sensor_core::models::FileOutcome;
use sensor_core::settings::PipelineConfig;
use sensor_core::FailureKind;
use sensor_runtime::{FileRouter, IntakeLoop};
use sensor_store::SqliteSink;
use tempfile::TempDir;

const HEADER: &str = "ts,device,co,humidity,light,lpg,motion,smoke,temp";

// ── Helpers ───────────────────────────────────────────────────────────────────

fn setup() -> (TempDir, Arc<PipelineConfig>, Arc<SqliteSink>) {
    let tmp = TempDir::new().unwrap();
    let config = PipelineConfig::rooted_at(tmp.path());
    for dir in config.directories() {
        std::fs::create_dir_all(dir).unwrap();
    }
    let sink = SqliteSink::open(&config.database_path, config.write_mode).unwrap();
    (tmp, Arc::new(config), Arc::new(sink))
}

fn count(db: &Path, sql: &str) -> i64 {
    let conn = Connection::open(db).unwrap();
    conn.query_row(sql, [], |r| r.get(0)).unwrap()
}

// ── Scenario ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_three_row_file_end_to_end() {
    let (_tmp, config, sink) = setup();
    let source = config.watch_dir.join("iot_readings_1.csv");
    std::fs::write(
        &source,
        format!(
            "{HEADER}\n\
             1700000000,X,0.0040,51.0,True,0.0070,False,0.0200,100\n\
             1700000060,X,0.0050,52.0,False,0.0080,True,0.0210,20\n\
             1700000120,X,0.0060,52.0,True,0.0090,False,0.0220,22\n"
        ),
    )
    .unwrap();

    let mut intake = IntakeLoop::new(config.clone(), sink);
    let report = intake.run_once().await;

    assert_eq!(report.discovered, 1);
    assert_eq!(report.partial, 1);
    let (_, outcome) = &report.outcomes[0];
    assert!(matches!(
        outcome,
        FileOutcome::QuarantinedPartial {
            valid_rows: 2,
            quarantined_rows: 1,
            ..
        }
    ));

    // Quarantine holds exactly the first row, untouched.
    let quarantined =
        std::fs::read_to_string(config.quarantine_dir.join("invalid_iot_readings_1.csv")).unwrap();
    let lines: Vec<&str> = quarantined.lines().collect();
    assert_eq!(
        lines,
        vec![HEADER, "1700000000,X,0.0040,51.0,True,0.0070,False,0.0200,100"]
    );

    // Raw store holds rows 2 and 3, tagged with the source file.
    let db = &config.database_path;
    assert_eq!(count(db, "SELECT COUNT(*) FROM iot_raw_data"), 2);
    assert_eq!(
        count(
            db,
            "SELECT COUNT(*) FROM iot_raw_data WHERE source_file = 'iot_readings_1.csv' AND device = 'X'"
        ),
        2
    );

    // One aggregate per metric for device X, over rows 2 and 3.
    let conn = Connection::open(db).unwrap();
    let mut stmt = conn
        .prepare(
            "SELECT sensor_type, min_value, max_value, avg_value, std_dev_value
             FROM sensor_aggregates WHERE device = 'X' ORDER BY sensor_type",
        )
        .unwrap();
    let rows: Vec<(String, f64, f64, f64, Option<f64>)> = stmt
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    let types: Vec<&str> = rows.iter().map(|r| r.0.as_str()).collect();
    assert_eq!(types, vec!["co", "humidity", "lpg", "smoke", "temp"]);

    let temp = &rows[4];
    assert_eq!(temp.1, 20.0);
    assert_eq!(temp.2, 22.0);
    assert_eq!(temp.3, 21.0);
    assert!((temp.4.unwrap() - 2.0_f64.sqrt()).abs() < 1e-9);

    let humidity = &rows[1];
    assert_eq!(humidity.1, 52.0);
    assert_eq!(humidity.4, Some(0.0));

    // Source moved to the archive.
    assert!(!source.exists());
    assert!(config.archive_dir.join("iot_readings_1.csv").exists());
}

#[tokio::test]
async fn test_structural_failure_is_isolated_per_file() {
    let (_tmp, config, sink) = setup();
    let row = "1700000000,D1,0.004,50.0,True,0.007,False,0.02,21.0";
    for name in ["a.csv", "c.csv", "d.csv"] {
        std::fs::write(config.watch_dir.join(name), format!("{HEADER}\n{row}\n")).unwrap();
    }
    let broken = config.watch_dir.join("b.csv");
    std::fs::write(&broken, "ts,device,co\n1700000000,D1,0.004\n").unwrap();

    let mut intake = IntakeLoop::new(config.clone(), sink);
    let report = intake.run_once().await;

    assert_eq!(report.discovered, 4);
    assert_eq!(report.succeeded, 3);
    assert_eq!(report.failed, 1);
    let failed: Vec<_> = report
        .outcomes
        .iter()
        .filter(|(_, o)| matches!(o, FileOutcome::Failed { kind: FailureKind::Structural, .. }))
        .map(|(p, _)| p.clone())
        .collect();
    assert_eq!(failed, vec![broken.clone()]);

    assert!(broken.exists());
    assert_eq!(count(&config.database_path, "SELECT COUNT(*) FROM iot_raw_data"), 3);
    assert_eq!(
        count(&config.database_path, "SELECT COUNT(*) FROM sensor_aggregates"),
        15
    );
}

#[tokio::test]
async fn test_unparsable_timestamp_fails_whole_file() {
    let (_tmp, config, sink) = setup();
    let path = config.watch_dir.join("ts.csv");
    std::fs::write(
        &path,
        format!(
            "{HEADER}\n\
             1700000000,X,0.004,50.0,True,0.007,False,0.02,21.0\n\
             yesterday,X,0.004,50.0,True,0.007,False,0.02,21.0\n"
        ),
    )
    .unwrap();

    let mut intake = IntakeLoop::new(config.clone(), sink);
    let report = intake.run_once().await;

    assert_eq!(report.failed, 1);
    assert!(path.exists());
    assert_eq!(count(&config.database_path, "SELECT COUNT(*) FROM iot_raw_data"), 0);
    assert!(!config.quarantine_dir.join("invalid_ts.csv").exists());
}

#[test]
fn test_same_bytes_via_two_paths_are_not_deduplicated() {
    let (_tmp, config, sink) = setup();
    let router = FileRouter::new(config.clone(), sink);
    let body = format!("{HEADER}\n1700000000,X,0.004,50.0,True,0.007,False,0.02,21.0\n");
    let first = config.watch_dir.join("copy_1.csv");
    let second = config.watch_dir.join("copy_2.csv");
    std::fs::write(&first, &body).unwrap();
    std::fs::write(&second, &body).unwrap();

    assert_eq!(router.process_file(&first), FileOutcome::Success { valid_rows: 1 });
    assert_eq!(router.process_file(&second), FileOutcome::Success { valid_rows: 1 });

    let db = &config.database_path;
    assert_eq!(count(db, "SELECT COUNT(*) FROM iot_raw_data"), 2);
    assert_eq!(
        count(db, "SELECT COUNT(DISTINCT source_file) FROM iot_raw_data"),
        2
    );
}
