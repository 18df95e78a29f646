mod bootstrap;

use std::sync::Arc;

use anyhow::{Context, Result};
use sensor_core::settings::Settings;
use sensor_runtime::IntakeLoop;
use sensor_store::SqliteSink;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load()?;
    let config = Arc::new(settings.to_pipeline_config()?);

    bootstrap::ensure_directories(&config)?;
    bootstrap::setup_logging(&settings.log_level, Some(&config.log_file))?;

    tracing::info!("Sensor pipeline v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Watching {} (archive: {}, quarantine: {}, dead letter: {})",
        config.watch_dir.display(),
        config.archive_dir.display(),
        config.quarantine_dir.display(),
        config.dead_letter_dir.display()
    );

    let sink = SqliteSink::open(&config.database_path, config.write_mode).with_context(|| {
        format!(
            "Failed to open database {}",
            config.database_path.display()
        )
    })?;

    let mut intake = IntakeLoop::new(config.clone(), Arc::new(sink));

    if settings.once {
        let report = intake.run_once().await;
        tracing::info!(
            "Single cycle finished: {} discovered, {} succeeded, {} partial, {} failed",
            report.discovered,
            report.succeeded,
            report.partial,
            report.failed
        );
        return Ok(());
    }

    let (mut rx, handle) = intake.start();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            report = rx.recv() => {
                match report {
                    Some(report) => {
                        tracing::debug!(dispatched = report.dispatched(), "Cycle report received");
                    }
                    None => {
                        tracing::warn!("Intake loop stopped unexpectedly");
                        break;
                    }
                }
            }
            _ = &mut shutdown => {
                tracing::info!("Ctrl+C received; stopping intake loop");
                handle.abort();
                break;
            }
        }
    }

    Ok(())
}
