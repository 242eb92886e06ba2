//! MCP tool implementations.
//!
//! This module contains the tool handlers, grouped by family:
//! - `query`: `select` and `execute_raw_sql`
//! - `write`: `insert`, `update`, `delete`
//! - `ddl`: table and index definition statements
//! - `transaction`: `execute_transaction`
//! - `schema`: `get_schema_info`, `get_table_info`
//! - `database`: `create_database`, `drop_database`, `list_databases`
//! - `backup`: `backup_database`, `restore_database`, `list_backups`,
//!   `check_backup_tools`
//!
//! `registry` names the tools and `dispatch` routes calls to the handlers.

pub mod backup;
pub mod database;
pub mod ddl;
pub mod dispatch;
pub mod query;
pub mod registry;
pub mod schema;
pub mod transaction;
pub mod write;

pub use dispatch::{ResultEnvelope, ToolDispatcher};
pub use registry::{ToolDefinition, ToolName, catalog};
