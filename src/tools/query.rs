//! Read and raw statement tools.
//!
//! This module implements the `select` and `execute_raw_sql` MCP tools.
//! `select` always fetches rows; `execute_raw_sql` decides between fetching
//! and executing from the statement text.

use crate::db::{PoolManager, fetch_rows, run_statement};
use crate::error::{DbError, DbResult};
use crate::models::{JsonRow, QueryParamInput, StatementOutcome, into_params};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Input for the select tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SelectInput {
    /// SQL SELECT statement. Use $1, $2, ... placeholders for parameters.
    pub query: String,
    /// Positional parameters for the placeholders
    #[serde(default)]
    pub params: Vec<QueryParamInput>,
    /// Run against this database instead of the default one (opens a direct connection)
    #[serde(default)]
    pub database_name: Option<String>,
}

/// Output from the select tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct SelectOutput {
    /// Number of rows returned
    pub row_count: usize,
    /// Result rows as column → value maps
    pub data: Vec<JsonRow>,
    /// Target database, when one was given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

/// Input for the execute_raw_sql tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RawSqlInput {
    /// Any SQL statement
    pub query: String,
    /// Positional parameters for $1, $2, ... placeholders
    #[serde(default)]
    pub params: Vec<QueryParamInput>,
}

/// Output from the execute_raw_sql tool.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RawSqlOutput {
    Rows {
        row_count: usize,
        data: Vec<JsonRow>,
    },
    Status {
        status: String,
        rows_affected: u64,
        message: String,
    },
}

impl From<StatementOutcome> for RawSqlOutput {
    fn from(outcome: StatementOutcome) -> Self {
        match outcome {
            StatementOutcome::Rows { data, row_count } => Self::Rows { row_count, data },
            StatementOutcome::Status {
                status,
                rows_affected,
            } => Self::Status {
                status,
                rows_affected,
                message: "Query executed successfully".to_string(),
            },
        }
    }
}

pub struct QueryToolHandler {
    pool: Arc<PoolManager>,
}

impl QueryToolHandler {
    pub fn new(pool: Arc<PoolManager>) -> Self {
        Self { pool }
    }

    pub async fn select(&self, input: SelectInput) -> DbResult<SelectOutput> {
        ensure_query(&input.query)?;
        let params = into_params(input.params);

        let mut handle = self.pool.acquire(input.database_name.as_deref()).await?;
        let result = fetch_rows(
            handle.conn(),
            &input.query,
            &params,
            self.pool.command_timeout(),
        )
        .await;
        handle.release().await;
        let data = result?;

        info!(
            row_count = data.len(),
            database = input.database_name.as_deref().unwrap_or(self.pool.default_database()),
            "Select executed"
        );

        Ok(SelectOutput {
            row_count: data.len(),
            data,
            database: input.database_name,
        })
    }

    pub async fn execute_raw_sql(&self, input: RawSqlInput) -> DbResult<RawSqlOutput> {
        ensure_query(&input.query)?;
        let params = into_params(input.params);

        let mut handle = self.pool.acquire(None).await?;
        let result = run_statement(
            handle.conn(),
            &input.query,
            &params,
            self.pool.command_timeout(),
        )
        .await;
        handle.release().await;
        let outcome = result?;

        info!("Raw SQL executed");
        Ok(outcome.into())
    }
}

/// Reject blank statement text before a connection is checked out.
pub(crate) fn ensure_query(query: &str) -> DbResult<()> {
    if query.trim().is_empty() {
        return Err(DbError::invalid_input("Query cannot be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value as JsonValue, json};

    #[test]
    fn test_select_input_deserialization() {
        let json = r#"{
            "query": "SELECT * FROM users WHERE id = $1",
            "params": [42],
            "database_name": "analytics"
        }"#;

        let input: SelectInput = serde_json::from_str(json).unwrap();
        assert_eq!(input.query, "SELECT * FROM users WHERE id = $1");
        assert_eq!(input.params.len(), 1);
        assert_eq!(input.database_name.as_deref(), Some("analytics"));
    }

    #[test]
    fn test_select_input_defaults() {
        let input: SelectInput = serde_json::from_str(r#"{"query": "SELECT 1"}"#).unwrap();
        assert!(input.params.is_empty());
        assert!(input.database_name.is_none());
    }

    #[test]
    fn test_select_output_row_count_matches_data() {
        let mut row = JsonRow::new();
        row.insert("id".to_string(), JsonValue::Number(1.into()));
        let output = SelectOutput {
            row_count: 1,
            data: vec![row],
            database: None,
        };

        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["row_count"], 1);
        assert_eq!(json["data"][0]["id"], 1);
        assert!(json.get("database").is_none());
    }

    #[test]
    fn test_raw_sql_output_shapes() {
        let rows: RawSqlOutput = StatementOutcome::rows(vec![JsonRow::new()]).into();
        let json = serde_json::to_value(&rows).unwrap();
        assert_eq!(json, json!({"row_count": 1, "data": [{}]}));

        let status: RawSqlOutput = StatementOutcome::status("UPDATE 3", 3).into();
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "UPDATE 3");
        assert_eq!(json["rows_affected"], 3);
        assert_eq!(json["message"], "Query executed successfully");
    }

    #[test]
    fn test_ensure_query_rejects_blank() {
        assert!(ensure_query("SELECT 1").is_ok());
        let err = ensure_query("   \n").unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }
}
