//! Statement execution engine.
//!
//! This module provides the execution primitives every statement handler
//! builds on:
//! - Fetch vs execute classification (`RETURNING` detection, leading keyword)
//! - Parameterized execution with a per-command timeout
//! - Backend-style command status tags and affected-row parsing
//!
//! sqlx reports only the affected-row count of a command, so the status tag
//! (`INSERT 0 5`, `UPDATE 3`, `CREATE TABLE`) is synthesized from the
//! statement's leading keywords. Affected rows are always read back from the
//! last whitespace-delimited token of the tag.

use crate::db::lexer::contains_keyword;
use crate::db::params::build_query;
use crate::db::types::rows_to_json;
use crate::error::{DbError, DbResult};
use crate::models::{JsonRow, QueryParam, StatementOutcome};
use sqlx::postgres::PgConnection;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Keywords whose statements always produce a row set.
const FETCH_KEYWORDS: &[&str] = &["SELECT", "WITH", "VALUES", "SHOW", "TABLE", "EXPLAIN"];

/// Modifiers skipped when naming the object in a DDL tag.
const DDL_MODIFIERS: &[&str] = &[
    "OR",
    "REPLACE",
    "UNIQUE",
    "TEMP",
    "TEMPORARY",
    "UNLOGGED",
    "GLOBAL",
    "LOCAL",
];

/// A backend-style command completion tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandStatus(String);

impl CommandStatus {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Tag for `sql` after it affected `rows_affected` rows.
    pub fn for_statement(sql: &str, rows_affected: u64) -> Self {
        let words = leading_words(sql, 8);
        let Some(verb) = words.first() else {
            return Self(String::new());
        };

        let tag = match verb.as_str() {
            "INSERT" => format!("INSERT 0 {}", rows_affected),
            "UPDATE" | "DELETE" | "MERGE" | "SELECT" | "COPY" | "FETCH" | "MOVE" => {
                format!("{} {}", verb, rows_affected)
            }
            "CREATE" | "ALTER" | "DROP" => {
                match words[1..]
                    .iter()
                    .find(|w| !DDL_MODIFIERS.contains(&w.as_str()))
                {
                    Some(object) => format!("{} {}", verb, object),
                    None => verb.clone(),
                }
            }
            _ => verb.clone(),
        };
        Self(tag)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn rows_affected(&self) -> u64 {
        parse_rows_affected(&self.0)
    }
}

impl std::fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Affected rows from a status tag: the last whitespace token, or 0 if it
/// is not a number.
pub fn parse_rows_affected(status: &str) -> u64 {
    status
        .split_whitespace()
        .last()
        .and_then(|token| token.parse().ok())
        .unwrap_or(0)
}

/// True when the statement has a `RETURNING` clause. Identifiers, literals
/// and comments that merely contain the word do not count.
pub fn has_returning_clause(sql: &str) -> bool {
    contains_keyword(sql, "RETURNING")
}

/// True when the statement should be fetched rather than executed.
pub fn is_fetch_statement(sql: &str) -> bool {
    if has_returning_clause(sql) {
        return true;
    }
    leading_words(sql, 1)
        .first()
        .is_some_and(|word| FETCH_KEYWORDS.contains(&word.as_str()))
}

/// First `limit` uppercase words of a statement, skipping leading
/// whitespace, comments and opening parentheses.
fn leading_words(sql: &str, limit: usize) -> Vec<String> {
    let mut rest = sql;
    loop {
        let trimmed = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '(');
        if let Some(after) = trimmed.strip_prefix("--") {
            rest = after.split_once('\n').map(|(_, r)| r).unwrap_or("");
        } else if let Some(after) = trimmed.strip_prefix("/*") {
            rest = after.split_once("*/").map(|(_, r)| r).unwrap_or("");
        } else {
            rest = trimmed;
            break;
        }
    }

    rest.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .take(limit)
        .map(str::to_uppercase)
        .collect()
}

/// Fetch all rows produced by `sql`.
///
/// Statements without parameters go through the simple query protocol so
/// that utility commands which cannot be prepared still work.
pub async fn fetch_rows(
    conn: &mut PgConnection,
    sql: &str,
    params: &[QueryParam],
    command_timeout: Duration,
) -> DbResult<Vec<JsonRow>> {
    debug!(sql = %sql, params = params.len(), "Fetching rows");

    let result = if params.is_empty() {
        use sqlx::Executor;
        timeout(command_timeout, conn.fetch_all(sql)).await
    } else {
        timeout(command_timeout, build_query(sql, params).fetch_all(&mut *conn)).await
    };

    match result {
        Ok(Ok(rows)) => Ok(rows_to_json(&rows)),
        Ok(Err(e)) => Err(DbError::from(e)),
        Err(_) => Err(timeout_error("query execution", command_timeout)),
    }
}

/// Execute `sql` and return its command status.
pub async fn execute_statement(
    conn: &mut PgConnection,
    sql: &str,
    params: &[QueryParam],
    command_timeout: Duration,
) -> DbResult<CommandStatus> {
    debug!(sql = %sql, params = params.len(), "Executing statement");

    let result = if params.is_empty() {
        use sqlx::Executor;
        timeout(command_timeout, conn.execute(sql)).await
    } else {
        timeout(command_timeout, build_query(sql, params).execute(&mut *conn)).await
    };

    match result {
        Ok(Ok(r)) => Ok(CommandStatus::for_statement(sql, r.rows_affected())),
        Ok(Err(e)) => Err(DbError::from(e)),
        Err(_) => Err(timeout_error("statement execution", command_timeout)),
    }
}

/// Fetch or execute `sql` depending on [`is_fetch_statement`].
pub async fn run_statement(
    conn: &mut PgConnection,
    sql: &str,
    params: &[QueryParam],
    command_timeout: Duration,
) -> DbResult<StatementOutcome> {
    if is_fetch_statement(sql) {
        let rows = fetch_rows(conn, sql, params, command_timeout).await?;
        Ok(StatementOutcome::rows(rows))
    } else {
        let status = execute_statement(conn, sql, params, command_timeout).await?;
        let rows_affected = status.rows_affected();
        Ok(StatementOutcome::status(status.0, rows_affected))
    }
}

fn timeout_error(operation: &str, timeout: Duration) -> DbError {
    DbError::timeout(operation, timeout.as_secs())
}
