//! Backup file naming and size measurement.

use crate::error::{DbError, DbResult};
use crate::models::BackupFormat;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

/// Timestamp format used in generated backup file names.
pub const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Resolve where a backup is written.
///
/// An existing directory, or a path with no extension that does not exist
/// yet, gets a generated `<database>_backup_<timestamp><ext>` file name.
/// Anything else is used as given.
pub fn resolve_backup_path(
    requested: &Path,
    database: &str,
    format: BackupFormat,
    now: DateTime<Local>,
) -> PathBuf {
    let treat_as_dir =
        requested.is_dir() || (requested.extension().is_none() && !requested.exists());
    if !treat_as_dir {
        return requested.to_path_buf();
    }

    requested.join(backup_file_name(database, format, now))
}

pub fn backup_file_name(database: &str, format: BackupFormat, now: DateTime<Local>) -> String {
    format!(
        "{}_backup_{}{}",
        database,
        now.format(BACKUP_TIMESTAMP_FORMAT),
        format.extension()
    )
}

/// Script backups always end in `.sql` or `.sql.gz`.
pub fn ensure_sql_extension(path: PathBuf) -> PathBuf {
    if has_suffix(&path, ".sql") || has_suffix(&path, ".sql.gz") {
        return path;
    }
    append_suffix(path, ".sql")
}

/// True for gzip-compressed files.
pub fn is_gzip_path(path: &Path) -> bool {
    has_suffix(path, ".gz")
}

/// Compressed script backups end in `.gz`.
pub fn ensure_gz_suffix(path: PathBuf) -> PathBuf {
    if is_gzip_path(&path) {
        return path;
    }
    append_suffix(path, ".gz")
}

fn has_suffix(path: &Path, suffix: &str) -> bool {
    path.as_os_str()
        .to_string_lossy()
        .to_lowercase()
        .ends_with(suffix)
}

fn append_suffix(path: PathBuf, suffix: &str) -> PathBuf {
    let mut os = path.into_os_string();
    os.push(suffix);
    PathBuf::from(os)
}

/// Create the parent directory of `path` if needed.
pub async fn ensure_parent_dir(path: &Path) -> DbResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}

/// Size of a file, or the recursive size of a directory archive.
pub async fn artifact_size(path: &Path) -> DbResult<u64> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || disk_usage(&path))
        .await
        .map_err(|e| DbError::internal(format!("Size task failed: {}", e)))?
}

fn disk_usage(path: &Path) -> DbResult<u64> {
    let meta = std::fs::metadata(path)?;
    if !meta.is_dir() {
        return Ok(meta.len());
    }
    let mut total = 0;
    for entry in std::fs::read_dir(path)? {
        total += disk_usage(&entry?.path())?;
    }
    Ok(total)
}
