//! PostgreSQL MCP Server Library
//!
//! This library exposes PostgreSQL operations as MCP (Model Context Protocol)
//! tools: queries and writes, DDL, transactions, schema introspection,
//! database administration, and backup/restore.

pub mod auth;
pub mod backup;
pub mod config;
pub mod db;
pub mod error;
pub mod mcp;
pub mod models;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::DbError;
pub use mcp::PgService;
pub use tools::{ResultEnvelope, ToolDispatcher};
