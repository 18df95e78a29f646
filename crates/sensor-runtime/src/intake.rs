//! Polling intake loop.
//!
//! Each cycle lists the watch directory, dispatches every eligible file to
//! the [`FileRouter`] on the blocking pool (at most `workers` at a time, each
//! bounded by `file_timeout`), then folds the per-file outcomes into a
//! [`CycleReport`]. [`IntakeLoop::start`] runs cycles forever in a tokio task
//! and streams the reports through an `mpsc` channel.
//!
//! Only structural failures count towards dead-lettering. Sink, timeout and
//! unexpected failures leave the file in the watch directory for the next
//! cycle, however often they repeat.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use sensor_core::error::{FailureKind, PipelineError};
use sensor_core::models::FileOutcome;
use sensor_core::settings::PipelineConfig;
use sensor_data::reader::{find_intake_files, source_file_name};
use sensor_store::Sink;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::dead_letter::{move_to_dead_letter, AttemptTracker, FailedFile};
use crate::router::FileRouter;

// ── Public types ──────────────────────────────────────────────────────────────

/// Summary of one poll cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// Eligible files found in the watch directory.
    pub discovered: usize,
    pub succeeded: usize,
    /// Files archived with some rows quarantined.
    pub partial: usize,
    pub failed: usize,
    /// Failed files moved to the dead-letter directory this cycle.
    pub dead_lettered: usize,
    /// Files skipped because earlier work on them is still running.
    pub skipped_in_flight: usize,
    /// Outcome of every dispatched file, in completion order.
    pub outcomes: Vec<(PathBuf, FileOutcome)>,
}

impl CycleReport {
    pub fn dispatched(&self) -> usize {
        self.outcomes.len()
    }
}

// ── IntakeLoop ────────────────────────────────────────────────────────────────

pub struct IntakeLoop {
    config: Arc<PipelineConfig>,
    router: Arc<FileRouter>,
    semaphore: Arc<Semaphore>,
    in_flight: Arc<Mutex<HashSet<PathBuf>>>,
    attempts: AttemptTracker,
}

impl IntakeLoop {
    pub fn new(config: Arc<PipelineConfig>, sink: Arc<dyn Sink>) -> Self {
        let router = FileRouter::new(config.clone(), sink);
        Self {
            semaphore: Arc::new(Semaphore::new(config.workers.max(1))),
            attempts: AttemptTracker::new(config.max_attempts),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            router: Arc::new(router),
            config,
        }
    }

    /// Run a single discover-and-dispatch cycle.
    pub async fn run_once(&mut self) -> CycleReport {
        let discovered_at = Utc::now();
        let files = find_intake_files(
            &self.config.watch_dir,
            &self.config.extension,
            self.config.include_pattern.as_ref(),
        );

        let mut report = CycleReport {
            discovered: files.len(),
            ..Default::default()
        };

        let mut tasks: JoinSet<(PathBuf, FileOutcome)> = JoinSet::new();
        let timeout = self.config.file_timeout;

        for path in files {
            let Some(guard) = InFlightGuard::claim(&self.in_flight, &path) else {
                debug!(file = %path.display(), "Still in flight; skipping");
                report.skipped_in_flight += 1;
                continue;
            };

            let permit = match self.semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let router = self.router.clone();

            tasks.spawn(async move {
                let _permit = permit;
                let target = path.clone();
                let work = tokio::task::spawn_blocking(move || {
                    let _guard = guard;
                    router.process_discovered(&target, discovered_at)
                });

                let outcome = match time::timeout(timeout, work).await {
                    Ok(Ok(outcome)) => outcome,
                    Ok(Err(e)) => FileOutcome::Failed {
                        kind: FailureKind::Unexpected,
                        reason: format!("worker panicked: {e}"),
                    },
                    Err(_) => {
                        let err = PipelineError::Timeout(timeout);
                        error!(file = %path.display(), kind = %FailureKind::Timeout, error = %err, "File processing failed");
                        FileOutcome::Failed {
                            kind: FailureKind::Timeout,
                            reason: err.to_string(),
                        }
                    }
                };
                (path, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((path, outcome)) => self.record(path, outcome, &mut report),
                Err(e) => {
                    error!(error = %e, "Intake task panicked");
                    report.failed += 1;
                }
            }
        }

        if report.discovered > 0 {
            info!(
                discovered = report.discovered,
                succeeded = report.succeeded,
                partial = report.partial,
                failed = report.failed,
                dead_lettered = report.dead_lettered,
                skipped = report.skipped_in_flight,
                "Cycle complete"
            );
        } else {
            debug!("Cycle complete; no files found");
        }

        report
    }

    /// Start the endless intake loop in a tokio task.
    ///
    /// The loop sleeps `poll_interval` after every cycle and exits once the
    /// returned receiver is dropped.
    pub fn start(self) -> (mpsc::Receiver<CycleReport>, IntakeHandle) {
        let (tx, rx) = mpsc::channel(16);

        let handle = tokio::spawn(async move {
            self.intake_loop(tx).await;
        });

        (rx, IntakeHandle { handle })
    }

    // ── Private implementation ────────────────────────────────────────────

    async fn intake_loop(mut self, tx: mpsc::Sender<CycleReport>) {
        info!(
            watch_dir = %self.config.watch_dir.display(),
            poll_secs = self.config.poll_interval.as_secs(),
            workers = self.config.workers,
            "Intake loop started"
        );

        loop {
            let report = self.run_once().await;

            if tx.send(report).await.is_err() {
                debug!("report channel closed; exiting intake loop");
                break;
            }

            time::sleep(self.config.poll_interval).await;
        }
    }

    fn record(&mut self, path: PathBuf, outcome: FileOutcome, report: &mut CycleReport) {
        let name = source_file_name(&path);

        match &outcome {
            FileOutcome::Success { .. } => {
                report.succeeded += 1;
                self.attempts.clear(&name);
            }
            FileOutcome::QuarantinedPartial { .. } => {
                report.partial += 1;
                self.attempts.clear(&name);
            }
            FileOutcome::Failed { kind, reason } => {
                report.failed += 1;

                if kind.is_retryable() {
                    warn!(file = %name, kind = %kind, "File left in watch directory for retry");
                } else {
                    let attempts = self.attempts.record_failure(&name);
                    if !self.attempts.is_exhausted(attempts) {
                        warn!(file = %name, attempts, kind = %kind, "File left in watch directory for retry");
                    } else if path.exists() {
                        self.dead_letter(&path, &name, *kind, reason, attempts, report);
                    }
                }
            }
        }

        report.outcomes.push((path, outcome));
    }

    fn dead_letter(
        &mut self,
        path: &Path,
        name: &str,
        kind: FailureKind,
        reason: &str,
        attempts: u32,
        report: &mut CycleReport,
    ) {
        let record = FailedFile {
            path: path.display().to_string(),
            error: reason.to_string(),
            kind,
            attempts,
            dead_lettered_at: Utc::now(),
        };

        match move_to_dead_letter(path, &self.config.dead_letter_dir, &record) {
            Ok(target) => {
                error!(
                    file = %name,
                    attempts,
                    kind = %kind,
                    target = %target.display(),
                    "File moved to dead-letter directory"
                );
                report.dead_lettered += 1;
                self.attempts.clear(name);
            }
            Err(e) => {
                error!(file = %name, error = %e, "Failed to dead-letter file");
            }
        }
    }
}

// ── IntakeHandle ──────────────────────────────────────────────────────────────

/// Handle to the background intake task.
pub struct IntakeHandle {
    handle: tokio::task::JoinHandle<()>,
}

impl IntakeHandle {
    /// Stop scheduling new cycles. Files already handed to the blocking pool
    /// run to completion.
    pub fn abort(&self) {
        self.handle.abort();
    }
}

// ── In-flight tracking ────────────────────────────────────────────────────────

/// Marks a path as being processed until dropped.
struct InFlightGuard {
    set: Arc<Mutex<HashSet<PathBuf>>>,
    path: PathBuf,
}

impl InFlightGuard {
    fn claim(set: &Arc<Mutex<HashSet<PathBuf>>>, path: &Path) -> Option<Self> {
        let mut guard = set.lock().unwrap_or_else(|e| e.into_inner());
        if !guard.insert(path.to_path_buf()) {
            return None;
        }
        Some(Self {
            set: set.clone(),
            path: path.to_path_buf(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut guard = self.set.lock().unwrap_or_else(|e| e.into_inner());
        guard.remove(&self.path);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
