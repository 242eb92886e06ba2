//! Backup and restore orchestration.
//!
//! Two strategies exist for each direction:
//! - External: the PostgreSQL client utilities (`pg_dump`, `pg_restore`,
//!   `psql`) run as child processes
//! - Script: SQL generated or replayed over a direct database connection
//!
//! Strategy choice lives in [`tools`], process invocation in [`external`] and
//! the script strategy in [`script`].

pub mod external;
pub mod listing;
pub mod path;
pub mod script;
pub mod tools;

use crate::models::BackupFormat;
use std::path::PathBuf;

pub use external::{PROCESS_TIMEOUT, ToolCommand, ToolOutput};
pub use listing::list_backups;
pub use script::{ScriptBackup, ScriptRestore};
pub use tools::{ToolAvailability, select_backup_strategy, select_restore_strategy};

/// A validated backup request with its resolved target path.
#[derive(Debug, Clone)]
pub struct BackupJob {
    pub database: String,
    pub path: PathBuf,
    pub format: BackupFormat,
    pub compress_level: u32,
    pub schema_only: bool,
    pub data_only: bool,
    pub tables: Vec<String>,
    pub exclude_tables: Vec<String>,
}

/// A validated restore request.
#[derive(Debug, Clone)]
pub struct RestoreJob {
    pub database: String,
    pub path: PathBuf,
    pub create_database: bool,
    pub clean: bool,
    pub data_only: bool,
    pub schema_only: bool,
}
