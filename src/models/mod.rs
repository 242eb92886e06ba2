//! Data models for the PostgreSQL MCP Server.
//!
//! This module re-exports all model types used throughout the application.

pub mod backup;
pub mod query;
pub mod schema;
pub mod transaction;

// Re-export commonly used types
pub use backup::{BackupEntry, BackupFormat, PgTool, Strategy, is_plain_sql_path};
pub use query::{JsonRow, QueryParam, QueryParamInput, StatementOutcome, into_params};
pub use schema::{
    ColumnInfo, ConstraintInfo, DatabaseInfo, IndexInfo, TableSchema, quote_identifier,
    quote_literal, quote_qualified_name,
};
pub use transaction::IsolationLevel;
