//! Intake-file discovery and CSV loading.
//!
//! Lists the watch directory for eligible files and turns one file into a
//! [`RawBatch`] of untyped rows for the validator.

use std::path::{Path, PathBuf};

use regex::Regex;
use sensor_core::error::{PipelineError, Result, StructuralError};
use sensor_core::models::{RawBatch, RawRecord};
use tracing::{debug, warn};

// ── Public API ────────────────────────────────────────────────────────────────

/// Find intake files directly inside `watch_dir`, sorted by file name.
///
/// A file is eligible when its extension equals `extension`
/// (case-insensitive), its name does not start with a dot, and it matches
/// `include` when one is given.
pub fn find_intake_files(
    watch_dir: &Path,
    extension: &str,
    include: Option<&Regex>,
) -> Vec<PathBuf> {
    if !watch_dir.exists() {
        warn!("Watch directory does not exist: {}", watch_dir.display());
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(watch_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy();
            !name.starts_with('.')
                && has_extension(entry.path(), extension)
                && include.map(|re| re.is_match(&name)).unwrap_or(true)
        })
        .map(|entry| entry.into_path())
        .collect();

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    files
}

/// Read the full row set of one intake file.
///
/// Short rows are padded with empty cells. A row longer than the header, or
/// text the CSV parser cannot tokenise, is a structural error.
pub fn read_intake_file(path: &Path) -> Result<RawBatch> {
    let file = std::fs::File::open(path).map_err(|source| PipelineError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;

    let batch = parse_intake(file).map_err(|e| match e {
        ParseError::Io(source) => PipelineError::FileRead {
            path: path.to_path_buf(),
            source,
        },
        ParseError::Structural(s) => PipelineError::Structural(s),
    })?;

    debug!(
        "File {}: {} columns, {} rows",
        path.display(),
        batch.headers.len(),
        batch.rows.len()
    );

    Ok(batch)
}

/// File name used to tag records, quarantine output and archive entries.
pub fn source_file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ── Internal helpers ──────────────────────────────────────────────────────────

enum ParseError {
    Io(std::io::Error),
    Structural(StructuralError),
}

fn parse_intake<R: std::io::Read>(input: R) -> std::result::Result<RawBatch, ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(input);

    let headers: Vec<String> = reader
        .headers()
        .map_err(classify)?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(classify)?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        if record.len() > headers.len() {
            return Err(ParseError::Structural(StructuralError::MalformedRow {
                line,
                message: format!(
                    "expected {} fields, found {}",
                    headers.len(),
                    record.len()
                ),
            }));
        }

        let mut values: Vec<String> = record.iter().map(|v| v.to_string()).collect();
        values.resize(headers.len(), String::new());
        rows.push(RawRecord { line, values });
    }

    Ok(RawBatch { headers, rows })
}

fn classify(err: csv::Error) -> ParseError {
    let line = err.position().map(|p| p.line()).unwrap_or(0);
    let message = err.to_string();
    match err.into_kind() {
        csv::ErrorKind::Io(e) => ParseError::Io(e),
        _ => ParseError::Structural(StructuralError::MalformedRow { line, message }),
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
