use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{CommandFactory, Parser, ValueEnum};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Name of the operational log file inside the log directory.
pub const LOG_FILE_NAME: &str = "pipeline.log";

/// Accepted `--log-level` values.
pub const LOG_LEVELS: [&str; 5] = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"];

const POLL_INTERVAL_SECS: std::ops::RangeInclusive<u64> = 1..=3600;
const WORKER_RANGE: std::ops::RangeInclusive<u32> = 1..=64;

// ── WriteMode ──────────────────────────────────────────────────────────────────

/// How raw rows and their aggregates are committed for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Raw rows and aggregates commit in a single transaction.
    Transactional,
    /// Raw rows and aggregates commit independently, raw first.
    Split,
}

impl WriteMode {
    pub fn as_str(self) -> &'static str {
        match self {
            WriteMode::Transactional => "transactional",
            WriteMode::Split => "split",
        }
    }
}

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Sensor-reading intake pipeline
#[derive(Parser, Debug, Clone)]
#[command(
    name = "sensor-pipeline",
    about = "Validate, quarantine, aggregate and archive sensor-reading files",
    version
)]
pub struct Settings {
    /// Directory polled for new intake files
    #[arg(long, env = "SENSOR_PIPELINE_WATCH_DIR", default_value = "./data")]
    pub watch_dir: PathBuf,

    /// Destination for successfully processed files
    #[arg(long, env = "SENSOR_PIPELINE_ARCHIVE_DIR", default_value = "./processed")]
    pub archive_dir: PathBuf,

    /// Destination for rejected rows
    #[arg(long, env = "SENSOR_PIPELINE_QUARANTINE_DIR", default_value = "./quarantine")]
    pub quarantine_dir: PathBuf,

    /// Destination for files that keep failing
    #[arg(long, env = "SENSOR_PIPELINE_DEAD_LETTER_DIR", default_value = "./dead_letter")]
    pub dead_letter_dir: PathBuf,

    /// Directory holding the operational log
    #[arg(long, env = "SENSOR_PIPELINE_LOG_DIR", default_value = "./logs")]
    pub log_dir: PathBuf,

    /// SQLite database file
    #[arg(long, env = "SENSOR_PIPELINE_DATABASE", default_value = "./iot_sensor.db")]
    pub database: PathBuf,

    /// Extension of intake files
    #[arg(long, env = "SENSOR_PIPELINE_EXTENSION", default_value = "csv")]
    pub extension: String,

    /// Only process files whose name matches this regex
    #[arg(long, env = "SENSOR_PIPELINE_INCLUDE_PATTERN")]
    pub include_pattern: Option<String>,

    /// Seconds between polls of the watch directory (1-3600)
    #[arg(long, env = "SENSOR_PIPELINE_POLL_INTERVAL", default_value = "5", value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub poll_interval: u64,

    /// Files processed concurrently (1-64)
    #[arg(long, env = "SENSOR_PIPELINE_WORKERS", default_value = "1", value_parser = clap::value_parser!(u32).range(1..=64))]
    pub workers: u32,

    /// Seconds a single file may take before it is abandoned for retry
    #[arg(long, env = "SENSOR_PIPELINE_FILE_TIMEOUT", default_value = "60")]
    pub file_timeout: u64,

    /// Failed attempts before a file is dead-lettered (0 = never)
    #[arg(long, env = "SENSOR_PIPELINE_MAX_ATTEMPTS", default_value = "3")]
    pub max_attempts: u32,

    /// Commit strategy for raw rows and aggregates
    #[arg(long, env = "SENSOR_PIPELINE_WRITE_MODE", value_enum, default_value = "transactional")]
    pub write_mode: WriteMode,

    /// Run a single poll cycle and exit
    #[arg(long)]
    pub once: bool,

    /// Logging level
    #[arg(long, env = "SENSOR_PIPELINE_LOG_LEVEL", default_value = "INFO", value_parser = clap::builder::PossibleValuesParser::new(LOG_LEVELS))]
    pub log_level: String,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// JSON file supplying defaults for options not given on the command line
    #[arg(long, env = "SENSOR_PIPELINE_CONFIG")]
    pub config: Option<PathBuf>,
}

// ── ConfigFile ─────────────────────────────────────────────────────────────────

/// Optional JSON overlay loaded via `--config`.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watch_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quarantine_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dead_letter_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_mode: Option<WriteMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl ConfigFile {
    /// Load an overlay from `path`. Unlike CLI defaults, a broken file is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| PipelineError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content)
            .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse process arguments and merge the `--config` overlay.
    pub fn load() -> Result<Self> {
        Self::load_from_args(std::env::args_os().collect())
    }

    /// Same as [`Settings::load`] with an explicit argument list.
    pub fn load_from_args(args: Vec<std::ffi::OsString>) -> Result<Self> {
        let matches = Settings::command().get_matches_from(args.clone());
        let mut settings = Settings::parse_from(args);

        if let Some(path) = settings.config.clone() {
            let overlay = ConfigFile::load_from(&path)?;
            settings.apply_overlay(overlay, &matches);
        }

        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }

        Ok(settings)
    }

    /// Fill in overlay values for options not supplied on the command line
    /// or through the environment.
    fn apply_overlay(&mut self, overlay: ConfigFile, matches: &clap::ArgMatches) {
        macro_rules! merge {
            ($field:ident) => {
                if !is_arg_explicitly_set(matches, stringify!($field)) {
                    if let Some(v) = overlay.$field {
                        self.$field = v;
                    }
                }
            };
        }

        merge!(watch_dir);
        merge!(archive_dir);
        merge!(quarantine_dir);
        merge!(dead_letter_dir);
        merge!(log_dir);
        merge!(database);
        merge!(extension);
        merge!(poll_interval);
        merge!(workers);
        merge!(file_timeout);
        merge!(max_attempts);
        merge!(write_mode);
        merge!(log_level);

        if !is_arg_explicitly_set(matches, "include_pattern") && self.include_pattern.is_none() {
            self.include_pattern = overlay.include_pattern;
        }
    }

    /// Validate and resolve into the immutable config handed to components.
    ///
    /// Overlay values never pass through clap, so the CLI ranges are checked
    /// again here.
    pub fn to_pipeline_config(&self) -> Result<PipelineConfig> {
        let extension = self.extension.trim().trim_start_matches('.').to_ascii_lowercase();
        if extension.is_empty() {
            return Err(PipelineError::Config(
                "extension must not be empty".to_string(),
            ));
        }
        if !POLL_INTERVAL_SECS.contains(&self.poll_interval) {
            return Err(PipelineError::Config(format!(
                "poll interval must be between 1 and 3600 seconds, got {}",
                self.poll_interval
            )));
        }
        if !WORKER_RANGE.contains(&self.workers) {
            return Err(PipelineError::Config(format!(
                "workers must be between 1 and 64, got {}",
                self.workers
            )));
        }
        if self.file_timeout == 0 {
            return Err(PipelineError::Config(
                "file timeout must be at least one second".to_string(),
            ));
        }
        let level = self.log_level.to_uppercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(PipelineError::Config(format!(
                "unknown log level {:?}; expected one of {}",
                self.log_level,
                LOG_LEVELS.join(", ")
            )));
        }

        let include_pattern = match self.include_pattern.as_deref() {
            Some(p) => Some(Regex::new(p).map_err(|e| {
                PipelineError::Config(format!("invalid include pattern {p:?}: {e}"))
            })?),
            None => None,
        };

        if self.watch_dir == self.archive_dir {
            return Err(PipelineError::Config(
                "archive directory must differ from the watch directory".to_string(),
            ));
        }

        Ok(PipelineConfig {
            watch_dir: self.watch_dir.clone(),
            archive_dir: self.archive_dir.clone(),
            quarantine_dir: self.quarantine_dir.clone(),
            dead_letter_dir: self.dead_letter_dir.clone(),
            log_file: self.log_dir.join(LOG_FILE_NAME),
            database_path: self.database.clone(),
            extension,
            include_pattern,
            poll_interval: Duration::from_secs(self.poll_interval),
            workers: self.workers as usize,
            file_timeout: Duration::from_secs(self.file_timeout),
            max_attempts: self.max_attempts,
            write_mode: self.write_mode,
        })
    }
}

// ── PipelineConfig ─────────────────────────────────────────────────────────────

/// Resolved, validated configuration shared by every pipeline component.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub watch_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub quarantine_dir: PathBuf,
    pub dead_letter_dir: PathBuf,
    pub log_file: PathBuf,
    pub database_path: PathBuf,
    /// Lowercase, without a leading dot.
    pub extension: String,
    pub include_pattern: Option<Regex>,
    pub poll_interval: Duration,
    pub workers: usize,
    pub file_timeout: Duration,
    /// `0` disables dead-lettering.
    pub max_attempts: u32,
    pub write_mode: WriteMode,
}

impl PipelineConfig {
    /// Config rooted at `base`, with every directory as a child of it.
    ///
    /// Used by tests and embedders that do not go through the CLI.
    pub fn rooted_at(base: &Path) -> Self {
        PipelineConfig {
            watch_dir: base.join("data"),
            archive_dir: base.join("processed"),
            quarantine_dir: base.join("quarantine"),
            dead_letter_dir: base.join("dead_letter"),
            log_file: base.join("logs").join(LOG_FILE_NAME),
            database_path: base.join("iot_sensor.db"),
            extension: "csv".to_string(),
            include_pattern: None,
            poll_interval: Duration::from_secs(5),
            workers: 1,
            file_timeout: Duration::from_secs(60),
            max_attempts: 3,
            write_mode: WriteMode::Transactional,
        }
    }

    /// Directories the pipeline reads from or writes into.
    pub fn directories(&self) -> Vec<&Path> {
        let mut dirs = vec![
            self.watch_dir.as_path(),
            self.archive_dir.as_path(),
            self.quarantine_dir.as_path(),
            self.dead_letter_dir.as_path(),
        ];
        if let Some(parent) = self.log_file.parent() {
            dirs.push(parent);
        }
        if let Some(parent) = self.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                dirs.push(parent);
            }
        }
        dirs
    }
}

// ── Helper: check if an arg was explicitly set ─────────────────────────────────

/// Returns `true` when `name` was supplied on the command line or through its
/// environment variable (not via default value).
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    matches!(
        matches.value_source(name),
        Some(clap::parser::ValueSource::CommandLine) | Some(clap::parser::ValueSource::EnvVariable)
    )
}

// ── Tests ──────────────────────────────────────────────────────────────────────
