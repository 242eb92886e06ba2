//! Tool catalog.
//!
//! The set of tools is fixed at compile time. [`ToolName`] is the lookup key
//! the dispatcher matches on, and [`ToolDefinition`] is what clients see when
//! listing tools: a name, a description and the JSON schema of the input.

use crate::error::DbError;
use crate::tools::backup::{BackupInput, CheckBackupToolsInput, ListBackupsInput, RestoreInput};
use crate::tools::database::{CreateDatabaseInput, DropDatabaseInput, ListDatabasesInput};
use crate::tools::ddl::{CreateTableInput, DdlStatementInput, DropIndexInput, DropTableInput};
use crate::tools::query::{RawSqlInput, SelectInput};
use crate::tools::schema::{SchemaInfoInput, TableInfoInput};
use crate::tools::transaction::TransactionInput;
use crate::tools::write::WriteInput;
use schemars::{JsonSchema, schema_for};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    Select,
    Insert,
    Update,
    Delete,
    CreateTable,
    AlterTable,
    DropTable,
    CreateIndex,
    DropIndex,
    ExecuteTransaction,
    GetSchemaInfo,
    GetTableInfo,
    ExecuteRawSql,
    CreateDatabase,
    DropDatabase,
    ListDatabases,
    BackupDatabase,
    RestoreDatabase,
    ListBackups,
    CheckBackupTools,
}

impl ToolName {
    pub const ALL: [ToolName; 20] = [
        Self::Select,
        Self::Insert,
        Self::Update,
        Self::Delete,
        Self::CreateTable,
        Self::AlterTable,
        Self::DropTable,
        Self::CreateIndex,
        Self::DropIndex,
        Self::ExecuteTransaction,
        Self::GetSchemaInfo,
        Self::GetTableInfo,
        Self::ExecuteRawSql,
        Self::CreateDatabase,
        Self::DropDatabase,
        Self::ListDatabases,
        Self::BackupDatabase,
        Self::RestoreDatabase,
        Self::ListBackups,
        Self::CheckBackupTools,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::CreateTable => "create_table",
            Self::AlterTable => "alter_table",
            Self::DropTable => "drop_table",
            Self::CreateIndex => "create_index",
            Self::DropIndex => "drop_index",
            Self::ExecuteTransaction => "execute_transaction",
            Self::GetSchemaInfo => "get_schema_info",
            Self::GetTableInfo => "get_table_info",
            Self::ExecuteRawSql => "execute_raw_sql",
            Self::CreateDatabase => "create_database",
            Self::DropDatabase => "drop_database",
            Self::ListDatabases => "list_databases",
            Self::BackupDatabase => "backup_database",
            Self::RestoreDatabase => "restore_database",
            Self::ListBackups => "list_backups",
            Self::CheckBackupTools => "check_backup_tools",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Select => {
                "Execute a SELECT query and return the rows.\nUse $1, $2, ... placeholders with `params`.\nSet `database_name` to query a database other than the default one."
            }
            Self::Insert => {
                "Execute an INSERT statement.\nWith a RETURNING clause the returned rows are included in `returned_data`."
            }
            Self::Update => {
                "Execute an UPDATE statement.\nWith a RETURNING clause the returned rows are included in `returned_data`."
            }
            Self::Delete => {
                "Execute a DELETE statement.\nWith a RETURNING clause the returned rows are included in `returned_data`."
            }
            Self::CreateTable => {
                "Execute a CREATE TABLE statement, optionally in another database (`database_name`)."
            }
            Self::AlterTable => "Execute an ALTER TABLE statement.",
            Self::DropTable => {
                "Drop a table by name (`name` or `schema.name`).\nDefaults: if_exists=true, cascade=false."
            }
            Self::CreateIndex => "Execute a CREATE INDEX statement.",
            Self::DropIndex => {
                "Drop an index by name (`name` or `schema.name`).\nDefaults: if_exists=true, cascade=false."
            }
            Self::ExecuteTransaction => {
                "Execute several statements in one transaction at the given isolation level.\nIf any statement fails the whole transaction is rolled back."
            }
            Self::GetSchemaInfo => {
                "List the tables of a schema with their columns and constraints."
            }
            Self::GetTableInfo => {
                "Describe one table: columns, constraints, indexes and current row count."
            }
            Self::ExecuteRawSql => {
                "Execute any SQL statement.\nRow-returning statements (SELECT, WITH, VALUES, SHOW, TABLE, EXPLAIN or RETURNING) return rows; others return the command status."
            }
            Self::CreateDatabase => {
                "Create a database. Names may contain only letters, digits, underscores and hyphens."
            }
            Self::DropDatabase => {
                "Drop a database. System databases (postgres, template0, template1) cannot be dropped.\nSet `force` to terminate other sessions first."
            }
            Self::ListDatabases => {
                "List databases with owner, encoding, size and active connection count."
            }
            Self::BackupDatabase => {
                "Back up a database with pg_dump, or with the SQL-based method when pg_dump is unavailable.\nFormats: custom (default), plain, directory, tar. Without pg_dump only plain SQL is produced."
            }
            Self::RestoreDatabase => {
                "Restore a database from a backup.\n.sql and .sql.gz files are replayed with psql or the SQL-based method; other formats need pg_restore."
            }
            Self::ListBackups => "List backup files in a directory, newest first.",
            Self::CheckBackupTools => {
                "Report which PostgreSQL client tools (pg_dump, pg_restore, psql) are installed."
            }
        }
    }

    /// JSON schema of the tool's input object.
    pub fn input_schema(&self) -> Map<String, JsonValue> {
        match self {
            Self::Select => schema_of::<SelectInput>(),
            Self::Insert | Self::Update | Self::Delete => schema_of::<WriteInput>(),
            Self::CreateTable => schema_of::<CreateTableInput>(),
            Self::AlterTable | Self::CreateIndex => schema_of::<DdlStatementInput>(),
            Self::DropTable => schema_of::<DropTableInput>(),
            Self::DropIndex => schema_of::<DropIndexInput>(),
            Self::ExecuteTransaction => schema_of::<TransactionInput>(),
            Self::GetSchemaInfo => schema_of::<SchemaInfoInput>(),
            Self::GetTableInfo => schema_of::<TableInfoInput>(),
            Self::ExecuteRawSql => schema_of::<RawSqlInput>(),
            Self::CreateDatabase => schema_of::<CreateDatabaseInput>(),
            Self::DropDatabase => schema_of::<DropDatabaseInput>(),
            Self::ListDatabases => schema_of::<ListDatabasesInput>(),
            Self::BackupDatabase => schema_of::<BackupInput>(),
            Self::RestoreDatabase => schema_of::<RestoreInput>(),
            Self::ListBackups => schema_of::<ListBackupsInput>(),
            Self::CheckBackupTools => schema_of::<CheckBackupToolsInput>(),
        }
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.as_str(),
            description: self.description(),
            input_schema: self.input_schema(),
        }
    }
}

fn schema_of<T: JsonSchema>() -> Map<String, JsonValue> {
    match serde_json::to_value(schema_for!(T)) {
        Ok(JsonValue::Object(map)) => map,
        _ => Map::new(),
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|tool| tool.as_str() == s)
            .copied()
            .ok_or_else(|| DbError::invalid_input(format!("Unknown tool: {}", s)))
    }
}

/// A tool as advertised to clients.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Map<String, JsonValue>,
}

/// Every tool, in catalog order.
pub fn catalog() -> Vec<ToolDefinition> {
    ToolName::ALL.iter().map(ToolName::definition).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_names_round_trip() {
        for tool in ToolName::ALL {
            assert_eq!(tool.as_str().parse::<ToolName>().unwrap(), tool);
        }
    }

    #[test]
    fn test_unknown_name() {
        let err = "drop_everything".parse::<ToolName>().unwrap_err();
        assert_eq!(err.kind(), "validation_error");
        assert!(err.to_string().contains("Unknown tool: drop_everything"));
        assert!("SELECT".parse::<ToolName>().is_err());
    }

    #[test]
    fn test_catalog_is_complete_and_unique() {
        let tools = catalog();
        assert_eq!(tools.len(), 20);
        let names: HashSet<&str> = tools.iter().map(|t| t.name).collect();
        assert_eq!(names.len(), 20);
        assert!(tools.iter().all(|t| !t.description.is_empty()));
    }

    #[test]
    fn test_schemas_declare_required_fields() {
        let schema = ToolName::Select.input_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], serde_json::json!(["query"]));

        let schema = ToolName::RestoreDatabase.input_schema();
        let required = schema["required"].as_array().unwrap();
        assert!(required.contains(&serde_json::json!("database_name")));
        assert!(required.contains(&serde_json::json!("backup_path")));

        let schema = ToolName::CheckBackupTools.input_schema();
        assert_eq!(schema["type"], "object");
    }

    #[test]
    fn test_isolation_levels_are_enumerated() {
        let schema = serde_json::to_string(&ToolName::ExecuteTransaction.input_schema()).unwrap();
        for level in ["read_uncommitted", "read_committed", "repeatable_read", "serializable"] {
            assert!(schema.contains(level), "{}", level);
        }
    }
}
