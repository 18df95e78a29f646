//! File names for archive, quarantine and dead-letter entries.
//!
//! A producer may reuse a file name for new bytes, so an entry that would
//! land on an existing name is suffixed with the discovery time instead.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// `<stem>.<millis>.<ext>`, or `<name>.<millis>` without an extension.
pub fn suffixed_name(file: &str, millis: i64) -> String {
    let name = Path::new(file);
    let stem = name
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.to_string());
    match name.extension() {
        Some(ext) => format!("{stem}.{millis}.{}", ext.to_string_lossy()),
        None => format!("{stem}.{millis}"),
    }
}

/// `dir/<file>` when free, otherwise `dir/` + [`suffixed_name`] for
/// `discovered_at`.
pub fn vacant_path(dir: &Path, file: &str, discovered_at: DateTime<Utc>) -> PathBuf {
    let target = dir.join(file);
    if target.exists() {
        dir.join(suffixed_name(file, discovered_at.timestamp_millis()))
    } else {
        target
    }
}
