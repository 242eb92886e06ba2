//! Write operation tools.
//!
//! This module implements the `insert`, `update` and `delete` MCP tools.
//! A statement with a `RETURNING` clause is fetched and its rows returned;
//! otherwise it is executed and the affected-row count is read from the
//! command status.

use crate::db::{PoolManager, execute_statement, fetch_rows, has_returning_clause};
use crate::error::DbResult;
use crate::models::{JsonRow, QueryParamInput, into_params};
use crate::tools::query::ensure_query;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Input for the insert, update and delete tools.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct WriteInput {
    /// SQL statement. Add a RETURNING clause to get the affected rows back.
    pub query: String,
    /// Positional parameters for $1, $2, ... placeholders
    #[serde(default)]
    pub params: Vec<QueryParamInput>,
}

/// Output from the insert, update and delete tools.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct WriteOutput {
    /// Number of rows affected (or returned, with RETURNING)
    pub rows_affected: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Command status tag, e.g. "INSERT 0 5"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Rows produced by a RETURNING clause
    #[serde(skip_serializing_if = "Option::is_none")]
    pub returned_data: Option<Vec<JsonRow>>,
}

/// Which write tool is running; decides the summary message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Insert,
    Update,
    Delete,
}

impl WriteKind {
    fn message(&self, rows_affected: u64) -> Option<String> {
        match self {
            Self::Insert => None,
            Self::Update => Some(format!("Updated {} row(s)", rows_affected)),
            Self::Delete => Some(format!("Deleted {} row(s)", rows_affected)),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

pub struct WriteToolHandler {
    pool: Arc<PoolManager>,
}

impl WriteToolHandler {
    pub fn new(pool: Arc<PoolManager>) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, input: WriteInput) -> DbResult<WriteOutput> {
        self.execute(WriteKind::Insert, input).await
    }

    pub async fn update(&self, input: WriteInput) -> DbResult<WriteOutput> {
        self.execute(WriteKind::Update, input).await
    }

    pub async fn delete(&self, input: WriteInput) -> DbResult<WriteOutput> {
        self.execute(WriteKind::Delete, input).await
    }

    async fn execute(&self, kind: WriteKind, input: WriteInput) -> DbResult<WriteOutput> {
        ensure_query(&input.query)?;
        let params = into_params(input.params);
        let timeout = self.pool.command_timeout();

        let mut handle = self.pool.acquire(None).await?;
        let output = if has_returning_clause(&input.query) {
            fetch_rows(handle.conn(), &input.query, &params, timeout)
                .await
                .map(|rows| WriteOutput::returning(kind, rows))
        } else {
            execute_statement(handle.conn(), &input.query, &params, timeout)
                .await
                .map(|status| {
                    let rows_affected = status.rows_affected();
                    WriteOutput {
                        rows_affected,
                        message: kind.message(rows_affected),
                        status: Some(status.to_string()),
                        returned_data: None,
                    }
                })
        };
        handle.release().await;
        let output = output?;

        info!(
            operation = kind.as_str(),
            rows_affected = output.rows_affected,
            "Write operation executed"
        );
        Ok(output)
    }
}

impl WriteOutput {
    fn returning(kind: WriteKind, rows: Vec<JsonRow>) -> Self {
        let rows_affected = rows.len() as u64;
        Self {
            rows_affected,
            message: kind.message(rows_affected),
            status: None,
            returned_data: Some(rows),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_input_defaults() {
        let json = r#"{"query": "INSERT INTO users (name) VALUES ($1)"}"#;
        let input: WriteInput = serde_json::from_str(json).unwrap();
        assert!(input.params.is_empty());
    }

    #[test]
    fn test_write_input_with_params() {
        let json = r#"{
            "query": "INSERT INTO users (name, age, tags) VALUES ($1, $2, $3)",
            "params": ["Alice", 30, {"role": "admin"}]
        }"#;
        let input: WriteInput = serde_json::from_str(json).unwrap();
        assert_eq!(input.params.len(), 3);
    }

    #[test]
    fn test_messages_per_kind() {
        assert_eq!(WriteKind::Insert.message(2), None);
        assert_eq!(WriteKind::Update.message(7).as_deref(), Some("Updated 7 row(s)"));
        assert_eq!(WriteKind::Delete.message(0).as_deref(), Some("Deleted 0 row(s)"));
    }

    #[test]
    fn test_returning_output_counts_rows() {
        let output = WriteOutput::returning(WriteKind::Insert, vec![JsonRow::new(), JsonRow::new()]);
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["rows_affected"], 2);
        assert_eq!(json["returned_data"].as_array().map(Vec::len), Some(2));
        assert!(json.get("status").is_none());
        assert!(json.get("message").is_none());
    }

    #[test]
    fn test_status_output_serialization() {
        let output = WriteOutput {
            rows_affected: 5,
            message: WriteKind::Update.message(5),
            status: Some("UPDATE 5".to_string()),
            returned_data: None,
        };
        let json = serde_json::to_string(&output).unwrap();
        assert!(json.contains("\"rows_affected\":5"));
        assert!(json.contains("Updated 5 row(s)"));
        assert!(!json.contains("returned_data"));
    }
}
