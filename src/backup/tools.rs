//! Client utility discovery and strategy selection.
//!
//! Whether `pg_dump`, `pg_restore` and `psql` are usable is decided by a PATH
//! lookup. Strategy selection is pure so it can be tested without the tools
//! installed.

use crate::error::{DbError, DbResult};
use crate::models::{BackupFormat, PgTool, Strategy, is_plain_sql_path};
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Bound on `--version` probes.
pub const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Which client utilities were found on PATH.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ToolAvailability {
    pub pg_dump: bool,
    pub pg_restore: bool,
    pub psql: bool,
}

impl ToolAvailability {
    /// Probe PATH for every tool.
    pub fn detect() -> Self {
        Self {
            pg_dump: is_on_path(PgTool::PgDump),
            pg_restore: is_on_path(PgTool::PgRestore),
            psql: is_on_path(PgTool::Psql),
        }
    }

    pub fn has(&self, tool: PgTool) -> bool {
        match tool {
            PgTool::PgDump => self.pg_dump,
            PgTool::PgRestore => self.pg_restore,
            PgTool::Psql => self.psql,
        }
    }

    pub fn all(&self) -> bool {
        self.pg_dump && self.pg_restore && self.psql
    }

    pub fn can_restore(&self) -> bool {
        self.pg_restore || self.psql
    }

    pub fn as_map(&self) -> BTreeMap<String, bool> {
        PgTool::ALL
            .iter()
            .map(|tool| (tool.binary().to_string(), self.has(*tool)))
            .collect()
    }
}

fn is_on_path(tool: PgTool) -> bool {
    match which::which(tool.binary()) {
        Ok(path) => {
            debug!(tool = %tool, path = %path.display(), "Found client utility");
            true
        }
        Err(_) => false,
    }
}

/// First line of `<tool> --version`, or a description of why it is unknown.
pub async fn tool_version(tool: PgTool, available: bool) -> String {
    if !available {
        return "Not found in PATH".to_string();
    }

    let probe = Command::new(tool.binary())
        .arg("--version")
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(VERSION_PROBE_TIMEOUT, probe).await {
        Ok(Ok(output)) if output.status.success() => String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .unwrap_or_else(|| "Available (version unknown)".to_string()),
        Ok(Ok(_)) => "Available (version unknown)".to_string(),
        Ok(Err(e)) => {
            warn!(tool = %tool, error = %e, "Version probe failed");
            format!("Available (error getting version: {})", e)
        }
        Err(_) => format!(
            "Available (error getting version: timed out after {}s)",
            VERSION_PROBE_TIMEOUT.as_secs()
        ),
    }
}

/// Install hints for missing tools on the current platform.
pub fn recommendations(availability: &ToolAvailability) -> Vec<String> {
    if availability.all() {
        return vec!["All PostgreSQL tools are available".to_string()];
    }

    let platform_hint = if cfg!(target_os = "windows") {
        "Windows: Download from https://www.postgresql.org/download/windows/"
    } else if cfg!(target_os = "macos") {
        "macOS: Run 'brew install postgresql'"
    } else {
        "Linux: Run 'sudo apt-get install postgresql-client' (Debian/Ubuntu) or 'sudo yum install postgresql' (RHEL/CentOS)"
    };

    vec![
        "Install PostgreSQL client tools to enable pg_dump/pg_restore functionality".to_string(),
        platform_hint.to_string(),
    ]
}

/// Choose how to back up, and the format actually produced.
///
/// `use_pg_dump`: `Some(true)` demands pg_dump, `Some(false)` forbids it,
/// `None` auto-detects. Without pg_dump only plain SQL can be produced.
pub fn select_backup_strategy(
    use_pg_dump: Option<bool>,
    format: BackupFormat,
    availability: &ToolAvailability,
) -> DbResult<(Strategy, BackupFormat)> {
    let use_tool = match use_pg_dump {
        Some(true) if !availability.pg_dump => {
            return Err(DbError::process(
                "pg_dump",
                "pg_dump tool not found in PATH. Please install PostgreSQL client tools or set use_pg_dump=false to use SQL-based method.",
            ));
        }
        Some(explicit) => explicit,
        None => availability.pg_dump && format != BackupFormat::Plain,
    };

    if use_tool {
        return Ok((Strategy::External(PgTool::PgDump), format));
    }
    if format != BackupFormat::Plain {
        warn!(format = %format, "Format requires pg_dump; falling back to plain SQL");
    }
    Ok((Strategy::Script, BackupFormat::Plain))
}

/// Choose how to restore `path`.
///
/// Plain SQL files are replayed by psql, everything else by pg_restore.
/// Non-plain archives cannot be replayed as a script.
pub fn select_restore_strategy(
    use_pg_restore: Option<bool>,
    path: &Path,
    availability: &ToolAvailability,
) -> DbResult<Strategy> {
    let plain = is_plain_sql_path(path);
    let tool = if plain { PgTool::Psql } else { PgTool::PgRestore };

    let use_tool = match use_pg_restore {
        Some(true) if !availability.has(tool) => {
            return Err(DbError::process(
                tool.binary(),
                format!(
                    "{} tool not found in PATH. Please install PostgreSQL client tools or set use_pg_restore=false to use SQL-based method.",
                    tool
                ),
            ));
        }
        Some(explicit) => explicit,
        None => availability.has(tool),
    };

    if use_tool {
        return Ok(Strategy::External(tool));
    }
    if !plain {
        return Err(DbError::invalid_input(format!(
            "Cannot restore '{}' using SQL-based method. This format requires pg_restore. Please install PostgreSQL client tools or use a .sql backup file.",
            path.display()
        )));
    }
    Ok(Strategy::Script)
}
