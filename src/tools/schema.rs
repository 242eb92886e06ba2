//! Schema introspection tools.
//!
//! This module implements `get_schema_info` and `get_table_info`. Both are
//! plain catalog reads on a pooled connection.

use crate::db::{PoolManager, SchemaInspector};
use crate::error::{DbError, DbResult};
use crate::models::{ColumnInfo, ConstraintInfo, IndexInfo, TableSchema};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

fn default_schema() -> String {
    "public".to_string()
}

/// Input for the get_schema_info tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SchemaInfoInput {
    /// Schema to describe. Default: public
    #[serde(default = "default_schema")]
    pub schema_name: String,
    /// Include pg_catalog and information_schema tables
    #[serde(default)]
    pub include_system_schemas: bool,
}

/// Output from the get_schema_info tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct SchemaInfoOutput {
    pub schema: String,
    pub tables: Vec<TableSchema>,
}

/// Input for the get_table_info tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct TableInfoInput {
    /// Table name
    pub table_name: String,
    /// Schema of the table. Default: public
    #[serde(default = "default_schema")]
    pub schema_name: String,
}

/// Output from the get_table_info tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct TableInfoOutput {
    pub table: String,
    pub schema: String,
    pub columns: Vec<ColumnInfo>,
    pub constraints: Vec<ConstraintInfo>,
    pub indexes: Vec<IndexInfo>,
    pub row_count: i64,
}

pub struct SchemaToolHandler {
    pool: Arc<PoolManager>,
    inspector: SchemaInspector,
}

impl SchemaToolHandler {
    pub fn new(pool: Arc<PoolManager>) -> Self {
        let inspector = SchemaInspector::new(pool.command_timeout());
        Self { pool, inspector }
    }

    pub async fn get_schema_info(&self, input: SchemaInfoInput) -> DbResult<SchemaInfoOutput> {
        let mut handle = self.pool.acquire(None).await?;
        let result = self
            .inspector
            .describe_schema(
                handle.conn(),
                &input.schema_name,
                input.include_system_schemas,
            )
            .await;
        handle.release().await;
        let tables = result?;

        info!(schema = %input.schema_name, tables = tables.len(), "Schema described");
        Ok(SchemaInfoOutput {
            schema: input.schema_name,
            tables,
        })
    }

    pub async fn get_table_info(&self, input: TableInfoInput) -> DbResult<TableInfoOutput> {
        if input.table_name.trim().is_empty() {
            return Err(DbError::invalid_input("Table name cannot be empty"));
        }

        let mut handle = self.pool.acquire(None).await?;
        let result = self
            .describe_table(handle.conn(), &input.schema_name, &input.table_name)
            .await;
        handle.release().await;
        let (columns, constraints, indexes, row_count) = result?;

        info!(
            schema = %input.schema_name,
            table = %input.table_name,
            row_count = row_count,
            "Table described"
        );
        Ok(TableInfoOutput {
            table: input.table_name,
            schema: input.schema_name,
            columns,
            constraints,
            indexes,
            row_count,
        })
    }

    async fn describe_table(
        &self,
        conn: &mut sqlx::PgConnection,
        schema: &str,
        table: &str,
    ) -> DbResult<(Vec<ColumnInfo>, Vec<ConstraintInfo>, Vec<IndexInfo>, i64)> {
        let columns = self.inspector.fetch_columns(conn, schema, table).await?;
        let constraints = self.inspector.fetch_constraints(conn, schema, table).await?;
        let indexes = self.inspector.fetch_indexes(conn, schema, table).await?;
        let row_count = self.inspector.count_rows(conn, schema, table).await?;
        Ok((columns, constraints, indexes, row_count))
    }
}
