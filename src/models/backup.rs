//! Backup and restore data models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Output format of a backup, mirroring `pg_dump -F`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum BackupFormat {
    #[default]
    Custom,
    Plain,
    Directory,
    Tar,
}

impl BackupFormat {
    /// File extension (with leading dot) used for generated backup names.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Custom => ".dump",
            Self::Plain => ".sql",
            Self::Tar => ".tar",
            Self::Directory => "",
        }
    }

    /// Single-letter value for `pg_dump -F`.
    pub fn pg_dump_flag(&self) -> &'static str {
        match self {
            Self::Custom => "c",
            Self::Plain => "p",
            Self::Directory => "d",
            Self::Tar => "t",
        }
    }

    /// Only custom and directory archives accept `-Z`.
    pub fn supports_compression(&self) -> bool {
        matches!(self, Self::Custom | Self::Directory)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Custom => "custom",
            Self::Plain => "plain",
            Self::Directory => "directory",
            Self::Tar => "tar",
        }
    }
}

impl std::fmt::Display for BackupFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External client utilities used for backup and restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PgTool {
    PgDump,
    PgRestore,
    Psql,
}

impl PgTool {
    pub const ALL: [PgTool; 3] = [PgTool::PgDump, PgTool::PgRestore, PgTool::Psql];

    /// Executable name looked up on PATH.
    pub fn binary(&self) -> &'static str {
        match self {
            Self::PgDump => "pg_dump",
            Self::PgRestore => "pg_restore",
            Self::Psql => "psql",
        }
    }
}

impl std::fmt::Display for PgTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.binary())
    }
}

/// How a backup or restore job is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Run an external client utility.
    External(PgTool),
    /// Generate or replay an SQL script over a direct connection.
    Script,
}

impl Strategy {
    /// Value reported as `method` in result envelopes.
    pub fn method(&self) -> &'static str {
        match self {
            Self::External(tool) => tool.binary(),
            Self::Script => "sql",
        }
    }
}

/// True for `.sql` and `.sql.gz` files.
pub fn is_plain_sql_path(path: &Path) -> bool {
    let name = path.to_string_lossy().to_lowercase();
    name.ends_with(".sql") || name.ends_with(".sql.gz")
}

/// Format guess for a file name, as reported by `list_backups`.
pub fn infer_format_label(file_name: &str) -> &'static str {
    let lower = file_name.to_lowercase();
    if lower.ends_with(".sql") || lower.ends_with(".sql.gz") {
        "plain SQL"
    } else if lower.ends_with(".dump") || lower.ends_with(".backup") {
        "custom"
    } else if lower.ends_with(".tar") {
        "tar"
    } else {
        "unknown"
    }
}

/// One file found by `list_backups`.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct BackupEntry {
    pub filename: String,
    pub full_path: String,
    pub size_bytes: u64,
    pub size_mb: f64,
    pub size_human: String,
    pub format: String,
    pub modified_date: String,
    pub created_date: String,
}

/// Round a byte count to megabytes with two decimals.
pub fn bytes_to_mb(bytes: u64) -> f64 {
    (bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_extension_and_flags() {
        assert_eq!(BackupFormat::Custom.extension(), ".dump");
        assert_eq!(BackupFormat::Plain.extension(), ".sql");
        assert_eq!(BackupFormat::Tar.extension(), ".tar");
        assert_eq!(BackupFormat::Directory.extension(), "");
        assert_eq!(BackupFormat::Directory.pg_dump_flag(), "d");
        assert!(BackupFormat::Custom.supports_compression());
        assert!(!BackupFormat::Tar.supports_compression());
        assert!(!BackupFormat::Plain.supports_compression());
    }

    #[test]
    fn test_plain_sql_detection() {
        assert!(is_plain_sql_path(Path::new("/b/x.sql")));
        assert!(is_plain_sql_path(Path::new("/b/x.SQL.gz")));
        assert!(!is_plain_sql_path(Path::new("/b/x.dump")));
        assert!(!is_plain_sql_path(Path::new("/b/x.gz")));
    }

    #[test]
    fn test_infer_format_label() {
        assert_eq!(infer_format_label("a.sql"), "plain SQL");
        assert_eq!(infer_format_label("a.sql.gz"), "plain SQL");
        assert_eq!(infer_format_label("a.backup"), "custom");
        assert_eq!(infer_format_label("a.tar"), "tar");
        assert_eq!(infer_format_label("notes.txt"), "unknown");
    }

    #[test]
    fn test_bytes_to_mb() {
        assert_eq!(bytes_to_mb(0), 0.0);
        assert_eq!(bytes_to_mb(1024 * 1024), 1.0);
        assert_eq!(bytes_to_mb(1_572_864), 1.5);
        assert_eq!(bytes_to_mb(1234), 0.0);
    }

    #[test]
    fn test_strategy_method() {
        assert_eq!(Strategy::External(PgTool::PgDump).method(), "pg_dump");
        assert_eq!(Strategy::Script.method(), "sql");
    }
}
