//! SQL-script backup and restore.
//!
//! Used when the client utilities are unavailable or not requested. The
//! backup reconstructs `CREATE TABLE` statements from the catalog and emits
//! one `INSERT` per row. The restore replays a script inside a single
//! transaction, wrapping each statement in a savepoint so one failure does
//! not abort the rest.

use crate::backup::{BackupJob, PROCESS_TIMEOUT};
use crate::backup::path::{ensure_gz_suffix, ensure_sql_extension, is_gzip_path};
use crate::db::split_statements;
use crate::db::types::PgValue;
use crate::db::{SchemaInspector, execute_statement};
use crate::error::{DbError, DbResult};
use crate::models::{ColumnInfo, quote_identifier};
use chrono::{DateTime, Local};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use sqlx::Connection;
use sqlx::postgres::PgConnection;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Schema the script strategy dumps when no tables are named.
const DEFAULT_SCHEMA: &str = "public";

/// Errors tolerated before a non-clean restore gives up.
const MAX_RESTORE_ERRORS: u64 = 10;

/// Error text kept per warning.
const WARNING_ERROR_CHARS: usize = 100;

/// Summary of a written script backup.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptBackup {
    pub path: PathBuf,
    pub tables_backed_up: usize,
    pub total_rows: u64,
    pub compressed: bool,
    /// Tables whose definition or data could not be read; the script holds
    /// an error comment in their place.
    pub failed_tables: Vec<String>,
}

/// Summary of a replayed script.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptRestore {
    pub statements_executed: u64,
    pub errors: u64,
    pub warnings: Vec<String>,
}

/// Final file name of a script backup: `.sql`, plus `.gz` when compressing.
pub fn script_target(path: PathBuf, compress_level: u32) -> PathBuf {
    let path = ensure_sql_extension(path);
    if compress_level > 0 {
        ensure_gz_suffix(path)
    } else {
        path
    }
}

/// Dump `job`'s tables over `conn` into `job.path`.
///
/// `job.path` is expected to already carry the final extension (see
/// [`script_target`]).
pub async fn write_backup(
    conn: &mut PgConnection,
    inspector: &SchemaInspector,
    job: &BackupJob,
) -> DbResult<ScriptBackup> {
    let mut tables = if job.tables.is_empty() {
        inspector.list_tables(conn, DEFAULT_SCHEMA, false).await?
    } else {
        job.tables.clone()
    };
    tables.retain(|t| !job.exclude_tables.contains(t));

    let mut script = ScriptBuilder::new(&job.database, Local::now());
    let mut failed_tables: Vec<String> = Vec::new();

    if !job.data_only {
        script.section("Schema Definitions");
        for table in &tables {
            match inspector.fetch_columns(conn, DEFAULT_SCHEMA, table).await {
                Ok(columns) => script.table_definition(table, &columns),
                Err(e) => {
                    warn!(table = %table, error = %e, "Failed to read table definition");
                    script.table_error(table, &e);
                    failed_tables.push(table.clone());
                }
            }
        }
    }

    let mut total_rows = 0u64;
    if !job.schema_only {
        script.section("Data");
        for table in &tables {
            let mut inserts = Vec::new();
            let dumped = inspector
                .dump_rows(conn, DEFAULT_SCHEMA, table, PROCESS_TIMEOUT, |row| {
                    inserts.push(insert_statement(table, &row))
                })
                .await;
            match dumped {
                Ok(rows) => {
                    total_rows += rows;
                    script.table_data(table, &inserts);
                }
                Err(e) => {
                    warn!(table = %table, error = %e, "Failed to read table data");
                    script.table_error(table, &e);
                    if !failed_tables.contains(table) {
                        failed_tables.push(table.clone());
                    }
                }
            }
        }
    }

    let compressed = write_script(&job.path, script.finish(), job.compress_level).await?;
    info!(
        database = %job.database,
        tables = tables.len(),
        rows = total_rows,
        compressed = compressed,
        failed = failed_tables.len(),
        "Script backup written"
    );

    Ok(ScriptBackup {
        path: job.path.clone(),
        tables_backed_up: tables.len() - failed_tables.len(),
        total_rows,
        compressed,
        failed_tables,
    })
}

/// Accumulates the text of a script backup.
struct ScriptBuilder {
    out: String,
}

impl ScriptBuilder {
    fn new(database: &str, generated: DateTime<Local>) -> Self {
        let mut out = String::new();
        out.push_str("-- PostgreSQL Database Backup\n");
        out.push_str(&format!("-- Database: {}\n", database));
        out.push_str(&format!("-- Generated: {}\n", generated.to_rfc3339()));
        out.push_str("-- Format: SQL\n\n");
        Self { out }
    }

    fn section(&mut self, title: &str) {
        self.out.push_str(&format!("-- {}\n\n", title));
    }

    fn table_definition(&mut self, table: &str, columns: &[ColumnInfo]) {
        let name = quote_identifier(table);
        let defs: Vec<String> = columns.iter().map(ColumnInfo::definition).collect();
        self.out.push_str(&format!("-- Table: {}\n", table));
        self.out
            .push_str(&format!("DROP TABLE IF EXISTS {} CASCADE;\n", name));
        self.out
            .push_str(&format!("CREATE TABLE {} (\n    {}\n);\n\n", name, defs.join(",\n    ")));
    }

    fn table_data(&mut self, table: &str, inserts: &[String]) {
        self.out.push_str(&format!("-- Data for table: {}\n", table));
        for insert in inserts {
            self.out.push_str(insert);
            self.out.push('\n');
        }
        self.out.push('\n');
    }

    fn table_error(&mut self, table: &str, error: &DbError) {
        let message = error.to_string().replace('\n', " ");
        self.out
            .push_str(&format!("-- Error backing up table {}: {}\n\n", table, message));
    }

    fn finish(self) -> String {
        self.out
    }
}

/// Write `contents`, gzipped when `compress_level > 0`. Returns whether the
/// file was compressed.
async fn write_script(path: &Path, contents: String, compress_level: u32) -> DbResult<bool> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> DbResult<bool> {
        if compress_level == 0 {
            std::fs::write(&path, contents)?;
            return Ok(false);
        }
        let file = std::fs::File::create(&path)?;
        let mut encoder = GzEncoder::new(file, Compression::new(compress_level));
        encoder.write_all(contents.as_bytes())?;
        encoder.finish()?;
        Ok(true)
    })
    .await
    .map_err(|e| DbError::internal(format!("Backup writer task failed: {}", e)))?
}

/// Read a script backup, decompressing `.gz` files.
pub async fn read_script(path: &Path) -> DbResult<String> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> DbResult<String> {
        let bytes = std::fs::read(&path)?;
        if !is_gzip_path(&path) {
            return Ok(String::from_utf8_lossy(&bytes).into_owned());
        }
        let mut text = String::new();
        GzDecoder::new(&bytes[..]).read_to_string(&mut text)?;
        Ok(text)
    })
    .await
    .map_err(|e| DbError::internal(format!("Backup reader task failed: {}", e)))?
}

/// Statements of `script` that apply to the requested restore mode.
pub fn restore_statements(script: &str, data_only: bool, schema_only: bool) -> Vec<String> {
    split_statements(script)
        .into_iter()
        .filter(|stmt| {
            let upper = stmt.to_uppercase();
            if data_only
                && ["CREATE TABLE", "DROP TABLE", "ALTER TABLE"]
                    .iter()
                    .any(|kw| upper.contains(kw))
            {
                return false;
            }
            !(schema_only && upper.contains("INSERT INTO"))
        })
        .collect()
}

/// Replay `statements` in one transaction with a savepoint per statement.
///
/// A non-clean restore stops after more than ten failures. If no statement
/// succeeds the whole restore fails with the first error.
pub async fn replay(
    conn: &mut PgConnection,
    statements: &[String],
    clean: bool,
    command_timeout: Duration,
) -> DbResult<ScriptRestore> {
    let mut tx = conn.begin().await?;
    let mut summary = ScriptRestore::default();
    let mut first_error = None;

    for (idx, stmt) in statements.iter().enumerate() {
        let mut savepoint = Connection::begin(&mut *tx).await?;
        match execute_statement(&mut savepoint, stmt, &[], command_timeout).await {
            Ok(_) => {
                savepoint.commit().await?;
                summary.statements_executed += 1;
            }
            Err(e) => {
                savepoint.rollback().await?;
                debug!(statement = idx + 1, error = %e, "Restore statement failed");
                summary.errors += 1;
                summary.warnings.push(format!(
                    "Error executing statement {}: {}",
                    idx + 1,
                    truncate_chars(&e.to_string(), WARNING_ERROR_CHARS)
                ));
                first_error.get_or_insert(e);

                if !clean && summary.errors > MAX_RESTORE_ERRORS {
                    tx.rollback().await?;
                    let cause = first_error
                        .as_ref()
                        .map(|e| format!(" First error: {}", e))
                        .unwrap_or_default();
                    let mut err = DbError::partial_failure(
                        format!(
                            "Too many errors during restore ({}). Stopping.{}",
                            summary.errors, cause
                        ),
                        summary.statements_executed,
                        summary.errors,
                        summary.warnings,
                    );
                    if let Some(cause) = first_error {
                        err = err.with_first_error(cause);
                    }
                    return Err(err);
                }
            }
        }
    }

    if summary.statements_executed == 0 {
        if let Some(e) = first_error {
            tx.rollback().await?;
            return Err(e);
        }
    }

    tx.commit().await?;
    Ok(summary)
}

/// One `INSERT` statement, terminated, for a dumped row.
fn insert_statement(table: &str, row: &[(String, PgValue)]) -> String {
    let columns: Vec<String> = row.iter().map(|(c, _)| quote_identifier(c)).collect();
    let values: Vec<String> = row.iter().map(|(_, v)| v.to_sql_literal()).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({});",
        quote_identifier(table),
        columns.join(", "),
        values.join(", ")
    )
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
