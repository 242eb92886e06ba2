//! Backup directory listing.

use crate::error::{DbError, DbResult};
use crate::models::backup::{BackupEntry, bytes_to_mb, infer_format_label};
use chrono::{DateTime, Local};
use glob::Pattern;
use std::path::Path;
use std::time::SystemTime;

/// Format bytes with binary units (1 kB = 1024 bytes).
pub fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::WINDOWS)
}

/// Regular files in `directory` whose name matches `pattern`, newest first.
pub async fn list_backups(directory: &Path, pattern: &str) -> DbResult<Vec<BackupEntry>> {
    let matcher = Pattern::new(pattern)
        .map_err(|e| DbError::invalid_input(format!("Invalid pattern '{}': {}", pattern, e)))?;

    let directory = directory.to_path_buf();
    tokio::task::spawn_blocking(move || scan(&directory, &matcher))
        .await
        .map_err(|e| DbError::internal(format!("Listing task failed: {}", e)))?
}

fn scan(directory: &Path, matcher: &Pattern) -> DbResult<Vec<BackupEntry>> {
    if !directory.exists() {
        return Err(DbError::not_found(format!(
            "Backup directory '{}'",
            directory.display()
        )));
    }
    if !directory.is_dir() {
        return Err(DbError::invalid_input(format!(
            "Path is not a directory: {}",
            directory.display()
        )));
    }

    let mut found = Vec::new();
    for entry in std::fs::read_dir(directory)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        let filename = entry.file_name().to_string_lossy().into_owned();
        if !matcher.matches(&filename) {
            continue;
        }

        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let created = meta.created().unwrap_or(modified);
        let size = meta.len();
        found.push((
            modified,
            BackupEntry {
                format: infer_format_label(&filename).to_string(),
                full_path: entry.path().to_string_lossy().into_owned(),
                filename,
                size_bytes: size,
                size_mb: bytes_to_mb(size),
                size_human: format_size(size),
                modified_date: rfc3339_local(modified),
                created_date: rfc3339_local(created),
            },
        ));
    }

    found.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(found.into_iter().map(|(_, entry)| entry).collect())
}

fn rfc3339_local(time: SystemTime) -> String {
    DateTime::<Local>::from(time).to_rfc3339()
}
