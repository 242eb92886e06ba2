//! Schema change tools.
//!
//! `create_table`, `alter_table` and `create_index` pass caller SQL through.
//! `drop_table` and `drop_index` build their statement from a quoted name.

use crate::db::{PoolManager, execute_statement};
use crate::error::{DbError, DbResult};
use crate::models::quote_qualified_name;
use crate::tools::query::ensure_query;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

fn default_true() -> bool {
    true
}

/// Input for the create_table tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CreateTableInput {
    /// CREATE TABLE statement
    pub query: String,
    /// Create the table in this database instead of the default one
    #[serde(default)]
    pub database_name: Option<String>,
}

/// Input for the alter_table and create_index tools.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DdlStatementInput {
    /// DDL statement to execute
    pub query: String,
}

/// Input for the drop_table tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DropTableInput {
    /// Table name, optionally schema-qualified (schema.table)
    pub table_name: String,
    /// Also drop dependent objects
    #[serde(default)]
    pub cascade: bool,
    /// Do not fail when the table is missing
    #[serde(default = "default_true")]
    pub if_exists: bool,
}

/// Input for the drop_index tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DropIndexInput {
    /// Index name, optionally schema-qualified (schema.index)
    pub index_name: String,
    /// Do not fail when the index is missing
    #[serde(default = "default_true")]
    pub if_exists: bool,
    /// Also drop dependent objects
    #[serde(default)]
    pub cascade: bool,
}

/// Output from the schema change tools.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct DdlOutput {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

impl DdlOutput {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            database: None,
        }
    }
}

pub struct DdlToolHandler {
    pool: Arc<PoolManager>,
}

impl DdlToolHandler {
    pub fn new(pool: Arc<PoolManager>) -> Self {
        Self { pool }
    }

    pub async fn create_table(&self, input: CreateTableInput) -> DbResult<DdlOutput> {
        ensure_query(&input.query)?;
        self.run(input.database_name.as_deref(), &input.query).await?;

        let message = match &input.database_name {
            Some(db) => format!("Table created successfully in database {}", db),
            None => "Table created successfully".to_string(),
        };
        info!(database = ?input.database_name, "Table created");
        Ok(DdlOutput {
            message,
            database: input.database_name,
        })
    }

    pub async fn alter_table(&self, input: DdlStatementInput) -> DbResult<DdlOutput> {
        ensure_query(&input.query)?;
        self.run(None, &input.query).await?;
        info!("Table altered");
        Ok(DdlOutput::new("Table altered successfully"))
    }

    pub async fn drop_table(&self, input: DropTableInput) -> DbResult<DdlOutput> {
        let sql = drop_table_sql(&input.table_name, input.if_exists, input.cascade)?;
        self.run(None, &sql).await?;
        info!(table = %input.table_name, "Table dropped");
        Ok(DdlOutput::new(format!(
            "Table '{}' dropped successfully",
            input.table_name
        )))
    }

    pub async fn create_index(&self, input: DdlStatementInput) -> DbResult<DdlOutput> {
        ensure_query(&input.query)?;
        self.run(None, &input.query).await?;
        info!("Index created");
        Ok(DdlOutput::new("Index created successfully"))
    }

    pub async fn drop_index(&self, input: DropIndexInput) -> DbResult<DdlOutput> {
        let sql = drop_index_sql(&input.index_name, input.if_exists, input.cascade)?;
        self.run(None, &sql).await?;
        info!(index = %input.index_name, "Index dropped");
        Ok(DdlOutput::new(format!(
            "Index '{}' dropped successfully",
            input.index_name
        )))
    }

    async fn run(&self, database: Option<&str>, sql: &str) -> DbResult<()> {
        let mut handle = self.pool.acquire(database).await?;
        let result =
            execute_statement(handle.conn(), sql, &[], self.pool.command_timeout()).await;
        handle.release().await;
        result.map(|_| ())
    }
}

fn drop_sql(object: &str, name: &str, if_exists: bool, cascade: bool) -> DbResult<String> {
    let quoted = quote_qualified_name(name).ok_or_else(|| {
        DbError::invalid_input(format!(
            "Invalid {} name '{}'. Use name or schema.name",
            object.to_lowercase(),
            name
        ))
    })?;
    Ok(format!(
        "DROP {} {}{}{}",
        object,
        if if_exists { "IF EXISTS " } else { "" },
        quoted,
        if cascade { " CASCADE" } else { "" }
    ))
}

pub(crate) fn drop_table_sql(name: &str, if_exists: bool, cascade: bool) -> DbResult<String> {
    drop_sql("TABLE", name, if_exists, cascade)
}

pub(crate) fn drop_index_sql(name: &str, if_exists: bool, cascade: bool) -> DbResult<String> {
    drop_sql("INDEX", name, if_exists, cascade)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_table_defaults() {
        let input: DropTableInput = serde_json::from_str(r#"{"table_name": "users"}"#).unwrap();
        assert!(input.if_exists);
        assert!(!input.cascade);
    }

    #[test]
    fn test_drop_index_defaults() {
        let input: DropIndexInput = serde_json::from_str(r#"{"index_name": "idx"}"#).unwrap();
        assert!(input.if_exists);
        assert!(!input.cascade);
    }

    #[test]
    fn test_drop_table_sql() {
        assert_eq!(
            drop_table_sql("users", true, false).unwrap(),
            "DROP TABLE IF EXISTS \"users\""
        );
        assert_eq!(
            drop_table_sql("sales.orders", false, true).unwrap(),
            "DROP TABLE \"sales\".\"orders\" CASCADE"
        );
    }

    #[test]
    fn test_drop_sql_quotes_hostile_names() {
        assert_eq!(
            drop_table_sql("x\"; DROP TABLE y; --", false, false).unwrap(),
            "DROP TABLE \"x\"\"; DROP TABLE y; --\""
        );
    }

    #[test]
    fn test_drop_index_sql() {
        assert_eq!(
            drop_index_sql("idx_users_email", true, true).unwrap(),
            "DROP INDEX IF EXISTS \"idx_users_email\" CASCADE"
        );
    }

    #[test]
    fn test_drop_sql_rejects_bad_names() {
        for name in ["", "a..b", "a.b.c", " "] {
            let err = drop_table_sql(name, true, false).unwrap_err();
            assert_eq!(err.kind(), "validation_error", "name {:?}", name);
        }
        assert!(drop_index_sql("", true, false).is_err());
    }

    #[test]
    fn test_create_table_input() {
        let input: CreateTableInput =
            serde_json::from_str(r#"{"query": "CREATE TABLE t (id int)", "database_name": "app2"}"#)
                .unwrap();
        assert_eq!(input.database_name.as_deref(), Some("app2"));
    }

    #[test]
    fn test_ddl_output_omits_missing_database() {
        let json = serde_json::to_value(DdlOutput::new("Index created successfully")).unwrap();
        assert_eq!(json["message"], "Index created successfully");
        assert!(json.get("database").is_none());
    }
}
