//! Backup and restore tools.
//!
//! This module implements `backup_database`, `restore_database`,
//! `list_backups` and `check_backup_tools`. Each backup or restore picks a
//! strategy up front (client utility or SQL script) from the request and the
//! utilities found on PATH, then runs it against the named database.

use crate::backup::path::{artifact_size, ensure_parent_dir, is_gzip_path, resolve_backup_path};
use crate::backup::tools::{recommendations, tool_version};
use crate::backup::{
    BackupJob, PROCESS_TIMEOUT, RestoreJob, ToolAvailability, ToolCommand, listing, script,
    select_backup_strategy, select_restore_strategy,
};
use crate::db::{PoolManager, SchemaInspector};
use crate::error::{DbError, DbResult};
use crate::models::backup::bytes_to_mb;
use crate::models::{BackupEntry, BackupFormat, PgTool, Strategy};
use crate::tools::database::{DatabaseToolHandler, validate_database_name};
use chrono::Local;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

const DEFAULT_COMPRESS_LEVEL: i64 = 6;

fn default_compress_level() -> i64 {
    DEFAULT_COMPRESS_LEVEL
}

fn default_pattern() -> String {
    "*".to_string()
}

/// Input for the backup_database tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct BackupInput {
    /// Database to back up
    pub database_name: String,
    /// Target file or directory. Directories get a generated
    /// `<database>_backup_<timestamp>` file name. Default: the server's backup directory
    #[serde(default)]
    pub backup_path: Option<String>,
    /// custom, plain, directory or tar. Default: custom
    #[serde(default)]
    pub format: BackupFormat,
    /// Compression level 0-9. Default: 6
    #[serde(default = "default_compress_level")]
    pub compress_level: i64,
    /// Dump only object definitions
    #[serde(default)]
    pub schema_only: bool,
    /// Dump only table contents
    #[serde(default)]
    pub data_only: bool,
    /// Restrict the dump to these tables
    #[serde(default)]
    pub tables: Vec<String>,
    /// Skip these tables
    #[serde(default)]
    pub exclude_tables: Vec<String>,
    /// true requires pg_dump, false forces the SQL-based method. Omit to auto-detect
    #[serde(default)]
    pub use_pg_dump: Option<bool>,
}

/// Output from the backup_database tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct BackupOutput {
    pub message: String,
    pub database_name: String,
    pub backup_path: String,
    pub backup_format: String,
    pub file_size_bytes: u64,
    pub file_size_mb: f64,
    pub schema_only: bool,
    pub data_only: bool,
    pub method: String,
    pub note: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tables_backed_up: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_rows: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compressed: Option<bool>,
    /// Tables left out of a script backup because reading them failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_tables: Option<Vec<String>>,
}

/// Input for the restore_database tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RestoreInput {
    /// Database to restore into
    pub database_name: String,
    /// Backup file (or directory archive) to restore
    pub backup_path: String,
    /// Create the database first if it does not exist
    #[serde(default)]
    pub create_database: bool,
    /// Drop objects before recreating them (pg_restore); keep going past errors (SQL-based)
    #[serde(default)]
    pub clean: bool,
    /// Restore only table contents
    #[serde(default)]
    pub data_only: bool,
    /// Restore only object definitions
    #[serde(default)]
    pub schema_only: bool,
    /// true requires the client utility, false forces the SQL-based method. Omit to auto-detect
    #[serde(default)]
    pub use_pg_restore: Option<bool>,
}

/// Output from the restore_database tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct RestoreOutput {
    pub message: String,
    pub database_name: String,
    pub backup_path: String,
    pub method: String,
    pub note: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statements_executed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
}

/// Input for the list_backups tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListBackupsInput {
    /// Directory to scan. Default: the server's backup directory
    #[serde(default)]
    pub backup_directory: Option<String>,
    /// Glob matched against file names. Default: *
    #[serde(default = "default_pattern")]
    pub pattern: String,
}

impl Default for ListBackupsInput {
    fn default() -> Self {
        Self {
            backup_directory: None,
            pattern: default_pattern(),
        }
    }
}

/// Output from the list_backups tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ListBackupsOutput {
    pub backup_directory: String,
    pub backup_count: usize,
    pub backups: Vec<BackupEntry>,
}

/// Input for the check_backup_tools tool (no parameters).
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct CheckBackupToolsInput {}

/// Output from the check_backup_tools tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct BackupToolsOutput {
    pub tools_available: BTreeMap<String, bool>,
    pub tool_details: BTreeMap<String, String>,
    pub can_backup_with_pg_dump: bool,
    pub can_restore_with_pg_tools: bool,
    pub all_tools_available: bool,
    pub recommendations: Vec<String>,
    pub fallback_methods: BTreeMap<String, String>,
}

pub struct BackupToolHandler {
    pool: Arc<PoolManager>,
    databases: DatabaseToolHandler,
    inspector: SchemaInspector,
    default_backup_dir: PathBuf,
}

impl BackupToolHandler {
    pub fn new(pool: Arc<PoolManager>, default_backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            databases: DatabaseToolHandler::new(pool.clone()),
            inspector: SchemaInspector::new(pool.command_timeout()),
            default_backup_dir: default_backup_dir.into(),
            pool,
        }
    }

    pub async fn backup_database(&self, input: BackupInput) -> DbResult<BackupOutput> {
        validate_database_name(&input.database_name)?;
        validate_modes(input.schema_only, input.data_only)?;
        let compress_level = validate_compress_level(input.compress_level)?;

        let availability = ToolAvailability::detect();
        let (strategy, format) =
            select_backup_strategy(input.use_pg_dump, input.format, &availability)?;

        let requested = input
            .backup_path
            .map(PathBuf::from)
            .unwrap_or_else(|| self.default_backup_dir.clone());
        let mut path = resolve_backup_path(&requested, &input.database_name, format, Local::now());
        if strategy == Strategy::Script {
            path = script::script_target(path, compress_level);
        }
        ensure_parent_dir(&path).await?;

        let job = BackupJob {
            database: input.database_name,
            path,
            format,
            compress_level,
            schema_only: input.schema_only,
            data_only: input.data_only,
            tables: input.tables,
            exclude_tables: input.exclude_tables,
        };
        info!(
            database = %job.database,
            path = %job.path.display(),
            method = strategy.method(),
            "Starting backup"
        );

        match strategy {
            Strategy::External(_) => self.backup_with_pg_dump(job).await,
            Strategy::Script => self.backup_with_script(job).await,
        }
    }

    async fn backup_with_pg_dump(&self, job: BackupJob) -> DbResult<BackupOutput> {
        let params = self.pool.connection_params(Some(&job.database)).await?;
        let output = ToolCommand::pg_dump(&params, &job).run(PROCESS_TIMEOUT).await?;
        if !output.succeeded() {
            return Err(output.into_error());
        }

        let size = artifact_size(&job.path).await?;
        info!(database = %job.database, bytes = size, "Backup completed with pg_dump");
        Ok(BackupOutput {
            message: format!(
                "Database '{}' backed up successfully using pg_dump",
                job.database
            ),
            backup_path: job.path.display().to_string(),
            backup_format: job.format.as_str().to_string(),
            file_size_bytes: size,
            file_size_mb: bytes_to_mb(size),
            schema_only: job.schema_only,
            data_only: job.data_only,
            method: Strategy::External(PgTool::PgDump).method().to_string(),
            note: "Backup created using pg_dump (recommended for large databases)".to_string(),
            tables_backed_up: None,
            total_rows: None,
            compressed: None,
            failed_tables: None,
            database_name: job.database,
        })
    }

    async fn backup_with_script(&self, job: BackupJob) -> DbResult<BackupOutput> {
        let mut handle = self.pool.acquire(Some(&job.database)).await?;
        let result = script::write_backup(handle.conn(), &self.inspector, &job).await;
        handle.release().await;
        let summary = result?;

        let size = artifact_size(&summary.path).await?;
        let message = if summary.failed_tables.is_empty() {
            format!(
                "Database '{}' backed up successfully using SQL-based method",
                job.database
            )
        } else {
            format!(
                "Database '{}' backed up using SQL-based method, but {} table(s) could not be read: {}",
                job.database,
                summary.failed_tables.len(),
                summary.failed_tables.join(", ")
            )
        };
        Ok(BackupOutput {
            message,
            backup_path: summary.path.display().to_string(),
            backup_format: "plain (SQL)".to_string(),
            file_size_bytes: size,
            file_size_mb: bytes_to_mb(size),
            schema_only: job.schema_only,
            data_only: job.data_only,
            method: Strategy::Script.method().to_string(),
            note: "Backup created using SQL-based method (no pg_dump required)".to_string(),
            tables_backed_up: Some(summary.tables_backed_up),
            total_rows: Some(if job.schema_only { 0 } else { summary.total_rows }),
            compressed: Some(summary.compressed),
            failed_tables: (!summary.failed_tables.is_empty()).then_some(summary.failed_tables),
            database_name: job.database,
        })
    }

    pub async fn restore_database(&self, input: RestoreInput) -> DbResult<RestoreOutput> {
        validate_database_name(&input.database_name)?;
        validate_modes(input.schema_only, input.data_only)?;

        let path = PathBuf::from(&input.backup_path);
        if !path.exists() {
            return Err(DbError::not_found(format!(
                "Backup file '{}'",
                path.display()
            )));
        }

        let availability = ToolAvailability::detect();
        let strategy = select_restore_strategy(input.use_pg_restore, &path, &availability)?;

        if input.create_database && self.databases.ensure_database(&input.database_name).await? {
            info!(database = %input.database_name, "Created database for restore");
        }

        let job = RestoreJob {
            database: input.database_name,
            path,
            create_database: input.create_database,
            clean: input.clean,
            data_only: input.data_only,
            schema_only: input.schema_only,
        };
        info!(
            database = %job.database,
            path = %job.path.display(),
            method = strategy.method(),
            "Starting restore"
        );

        match strategy {
            Strategy::External(tool) => self.restore_with_tool(tool, job).await,
            Strategy::Script => self.restore_with_script(job).await,
        }
    }

    async fn restore_with_tool(&self, tool: PgTool, job: RestoreJob) -> DbResult<RestoreOutput> {
        let params = self.pool.connection_params(Some(&job.database)).await?;
        let command = match tool {
            PgTool::Psql if is_gzip_path(&job.path) => {
                let text = script::read_script(&job.path).await?;
                ToolCommand::psql_script(&params, &job, text)
            }
            PgTool::Psql => ToolCommand::psql(&params, &job),
            _ => ToolCommand::pg_restore(&params, &job),
        };
        let output = command.run(PROCESS_TIMEOUT).await?;
        if !output.restore_succeeded() {
            return Err(output.into_error());
        }

        let warnings: Vec<String> = output
            .stderr
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        info!(database = %job.database, tool = %tool, "Restore completed");
        Ok(RestoreOutput {
            message: format!(
                "Database '{}' restored successfully using {}",
                job.database, tool
            ),
            backup_path: job.path.display().to_string(),
            method: tool.binary().to_string(),
            note: format!("Restore completed using {}", tool),
            statements_executed: None,
            errors: None,
            warnings: (!warnings.is_empty()).then_some(warnings),
            database_name: job.database,
        })
    }

    async fn restore_with_script(&self, job: RestoreJob) -> DbResult<RestoreOutput> {
        let text = script::read_script(&job.path).await?;
        let statements = script::restore_statements(&text, job.data_only, job.schema_only);

        let mut handle = self.pool.acquire(Some(&job.database)).await?;
        let result = script::replay(
            handle.conn(),
            &statements,
            job.clean,
            self.pool.command_timeout(),
        )
        .await;
        handle.release().await;
        let summary = result?;

        info!(
            database = %job.database,
            executed = summary.statements_executed,
            errors = summary.errors,
            "Restore completed with SQL-based method"
        );
        Ok(RestoreOutput {
            message: format!(
                "Database '{}' restored successfully using SQL-based method",
                job.database
            ),
            backup_path: job.path.display().to_string(),
            method: Strategy::Script.method().to_string(),
            note: "Restore completed using SQL-based method (no pg_restore required)".to_string(),
            statements_executed: Some(summary.statements_executed),
            errors: Some(summary.errors),
            warnings: (!summary.warnings.is_empty()).then_some(summary.warnings),
            database_name: job.database,
        })
    }

    pub async fn list_backups(&self, input: ListBackupsInput) -> DbResult<ListBackupsOutput> {
        let directory = input
            .backup_directory
            .map(PathBuf::from)
            .unwrap_or_else(|| self.default_backup_dir.clone());
        let backups = listing::list_backups(&directory, &input.pattern).await?;

        Ok(ListBackupsOutput {
            backup_directory: directory.display().to_string(),
            backup_count: backups.len(),
            backups,
        })
    }

    pub async fn check_backup_tools(&self) -> DbResult<BackupToolsOutput> {
        let availability = ToolAvailability::detect();

        let mut tool_details = BTreeMap::new();
        for tool in PgTool::ALL {
            let version = tool_version(tool, availability.has(tool)).await;
            tool_details.insert(tool.binary().to_string(), version);
        }

        let fallback_methods = BTreeMap::from([
            (
                "backup".to_string(),
                "SQL-based backup available (works without pg_dump)".to_string(),
            ),
            (
                "restore".to_string(),
                "SQL-based restore available for .sql files (works without pg_restore)"
                    .to_string(),
            ),
        ]);

        Ok(BackupToolsOutput {
            tools_available: availability.as_map(),
            tool_details,
            can_backup_with_pg_dump: availability.pg_dump,
            can_restore_with_pg_tools: availability.can_restore(),
            all_tools_available: availability.all(),
            recommendations: recommendations(&availability),
            fallback_methods,
        })
    }
}

fn validate_modes(schema_only: bool, data_only: bool) -> DbResult<()> {
    if schema_only && data_only {
        return Err(DbError::invalid_input(
            "Cannot use both schema_only and data_only",
        ));
    }
    Ok(())
}

fn validate_compress_level(level: i64) -> DbResult<u32> {
    match u32::try_from(level) {
        Ok(level) if level <= 9 => Ok(level),
        _ => Err(DbError::invalid_input(format!(
            "compress_level must be between 0 and 9, got {}",
            level
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolSettings;
    use crate::db::StaticCredential;

    fn handler(backup_dir: &std::path::Path) -> BackupToolHandler {
        let provider =
            Arc::new(StaticCredential::from_url("postgres://u:p@127.0.0.1:1/app").unwrap());
        let pool = Arc::new(PoolManager::new(provider, PoolSettings::default(), "postgres"));
        BackupToolHandler::new(pool, backup_dir)
    }

    fn backup_input(json: serde_json::Value) -> BackupInput {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_backup_input_defaults() {
        let input = backup_input(serde_json::json!({"database_name": "shop"}));
        assert_eq!(input.format, BackupFormat::Custom);
        assert_eq!(input.compress_level, 6);
        assert!(input.backup_path.is_none());
        assert!(input.use_pg_dump.is_none());
        assert!(input.tables.is_empty());
    }

    #[test]
    fn test_format_names() {
        let input = backup_input(serde_json::json!({"database_name": "x", "format": "directory"}));
        assert_eq!(input.format, BackupFormat::Directory);
        assert!(
            serde_json::from_value::<BackupInput>(
                serde_json::json!({"database_name": "x", "format": "zip"})
            )
            .is_err()
        );
    }

    #[test]
    fn test_validate_compress_level() {
        assert_eq!(validate_compress_level(0).unwrap(), 0);
        assert_eq!(validate_compress_level(9).unwrap(), 9);
        assert_eq!(validate_compress_level(10).unwrap_err().kind(), "validation_error");
        assert_eq!(validate_compress_level(-1).unwrap_err().kind(), "validation_error");
    }

    #[tokio::test]
    async fn test_backup_rejects_invalid_requests_before_connecting() {
        let dir = tempfile::tempdir().unwrap();
        let handler = handler(dir.path());

        for json in [
            serde_json::json!({"database_name": "shop", "schema_only": true, "data_only": true}),
            serde_json::json!({"database_name": "shop", "compress_level": 12}),
            serde_json::json!({"database_name": "shop; rm -rf /"}),
        ] {
            let err = handler.backup_database(backup_input(json)).await.unwrap_err();
            assert_eq!(err.kind(), "validation_error");
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_restore_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let handler = handler(dir.path());
        let err = handler
            .restore_database(RestoreInput {
                database_name: "shop".to_string(),
                backup_path: dir.path().join("missing.sql").display().to_string(),
                create_database: false,
                clean: false,
                data_only: false,
                schema_only: false,
                use_pg_restore: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn test_restore_archive_without_pg_restore_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("x.dump");
        std::fs::write(&archive, b"PGDMP").unwrap();

        let err = handler(dir.path())
            .restore_database(RestoreInput {
                database_name: "shop".to_string(),
                backup_path: archive.display().to_string(),
                create_database: false,
                clean: false,
                data_only: false,
                schema_only: false,
                use_pg_restore: Some(false),
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("requires pg_restore"));
    }

    #[tokio::test]
    async fn test_list_backups_uses_default_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.sql"), b"SELECT 1;").unwrap();
        std::fs::write(dir.path().join("b.txt"), b"notes").unwrap();

        let output = handler(dir.path())
            .list_backups(ListBackupsInput {
                backup_directory: None,
                pattern: "*.sql".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(output.backup_count, 1);
        assert_eq!(output.backups[0].filename, "a.sql");
        assert_eq!(output.backup_directory, dir.path().display().to_string());
    }

    #[tokio::test]
    async fn test_check_backup_tools_is_consistent() {
        let dir = tempfile::tempdir().unwrap();
        let output = handler(dir.path()).check_backup_tools().await.unwrap();

        assert_eq!(output.tools_available.len(), 3);
        assert_eq!(output.tool_details.len(), 3);
        assert_eq!(
            output.all_tools_available,
            output.tools_available.values().all(|v| *v)
        );
        assert_eq!(
            output.can_backup_with_pg_dump,
            output.tools_available["pg_dump"]
        );
        assert!(output.fallback_methods.contains_key("backup"));
        assert!(!output.recommendations.is_empty());
    }
}
