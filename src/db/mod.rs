//! Database access layer.
//!
//! This module provides database access functionality:
//! - Credential resolution (static URL or refreshed access token)
//! - Connection pool management and direct connections
//! - Statement execution with per-command timeouts
//! - Schema introspection
//! - Quote-aware SQL scanning (statement splitting, keyword search)
//! - Type mappings between PostgreSQL values and JSON / SQL literals

pub mod credentials;
pub mod executor;
pub mod lexer;
pub mod params;
pub mod pool;
pub mod schema;
pub mod token;
pub mod types;

pub use credentials::{ConnectionParams, CredentialProvider, RefreshedTokenCredential, StaticCredential};
pub use executor::{
    CommandStatus, execute_statement, fetch_rows, has_returning_clause, is_fetch_statement,
    parse_rows_affected, run_statement,
};
pub use lexer::{contains_keyword, split_statements};
pub use pool::{ConnectionHandle, PoolManager};
pub use schema::{SYSTEM_DATABASES, SchemaInspector};
pub use token::{AccessToken, AzureCliTokenSource, ClientSecretTokenSource, TokenSource};
