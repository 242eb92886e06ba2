//! Error types for the PostgreSQL MCP Server.
//!
//! Every failure a tool can hit is one of these variants. The dispatcher turns
//! them into failed result envelopes; nothing here is ever surfaced as a
//! protocol-level fault.

use serde_json::{Map, Value as JsonValue, json};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("{tool} failed: {message}")]
    Process {
        tool: String,
        message: String,
        stderr: Option<String>,
        stdout: Option<String>,
    },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout { operation: String, elapsed_secs: u64 },

    #[error("{message}")]
    PartialFailure {
        message: String,
        statements_executed: u64,
        errors: u64,
        warnings: Vec<String>,
        /// The earliest failure, usually the root cause of the rest.
        first_error: Option<Box<DbError>>,
    },

    #[error("{object} already exists")]
    AlreadyExists { object: String },

    #[error("{object} does not exist")]
    NotFound { object: String },

    #[error("I/O error: {message}")]
    Io { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create an external process error.
    pub fn process(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Process {
            tool: tool.into(),
            message: message.into(),
            stderr: None,
            stdout: None,
        }
    }

    /// Create an external process error carrying the captured output streams.
    pub fn process_output(
        tool: impl Into<String>,
        message: impl Into<String>,
        stderr: impl Into<String>,
        stdout: impl Into<String>,
    ) -> Self {
        let stderr = stderr.into();
        let stdout = stdout.into();
        Self::Process {
            tool: tool.into(),
            message: message.into(),
            stderr: (!stderr.is_empty()).then_some(stderr),
            stdout: (!stdout.is_empty()).then_some(stdout),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    pub fn partial_failure(
        message: impl Into<String>,
        statements_executed: u64,
        errors: u64,
        warnings: Vec<String>,
    ) -> Self {
        Self::PartialFailure {
            message: message.into(),
            statements_executed,
            errors,
            warnings,
            first_error: None,
        }
    }

    /// Attach the earliest failure to a partial failure.
    pub fn with_first_error(mut self, cause: DbError) -> Self {
        if let Self::PartialFailure { first_error, .. } = &mut self {
            *first_error = Some(Box::new(cause));
        }
        self
    }

    pub fn already_exists(object: impl Into<String>) -> Self {
        Self::AlreadyExists {
            object: object.into(),
        }
    }

    pub fn not_found(object: impl Into<String>) -> Self {
        Self::NotFound {
            object: object.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable machine-readable category, reported as `error_kind` in envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "validation_error",
            Self::Connection { .. } => "connection_error",
            Self::Database { .. } => "statement_error",
            Self::Process { .. } => "process_error",
            Self::Timeout { .. } => "timeout_error",
            Self::PartialFailure { .. } => "partial_failure",
            Self::AlreadyExists { .. } => "already_exists",
            Self::NotFound { .. } => "not_found",
            Self::Io { .. } => "io_error",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            Self::Timeout { .. } => {
                Some("Consider increasing the timeout or optimizing the operation")
            }
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }

    /// Extra diagnostic fields attached to a failed envelope.
    pub fn details(&self) -> Map<String, JsonValue> {
        let mut details = Map::new();
        match self {
            Self::Database {
                sql_state: Some(code),
                ..
            } => {
                details.insert("sql_state".into(), json!(code));
            }
            Self::Process { stderr, stdout, .. } => {
                if let Some(stderr) = stderr {
                    details.insert("stderr".into(), json!(stderr));
                }
                if let Some(stdout) = stdout {
                    details.insert("stdout".into(), json!(stdout));
                }
            }
            Self::PartialFailure {
                statements_executed,
                errors,
                warnings,
                first_error,
                ..
            } => {
                details.insert("statements_executed".into(), json!(statements_executed));
                details.insert("errors".into(), json!(errors));
                details.insert("warnings".into(), json!(warnings));
                if let Some(cause) = first_error {
                    let mut first = Map::new();
                    first.insert("kind".into(), json!(cause.kind()));
                    first.insert("message".into(), json!(cause.to_string()));
                    if let Self::Database {
                        sql_state: Some(code),
                        ..
                    } = cause.as_ref()
                    {
                        first.insert("sql_state".into(), json!(code));
                    }
                    details.insert("first_error".into(), JsonValue::Object(first));
                }
            }
            _ => {}
        }
        if let Some(suggestion) = self.suggestion() {
            details.insert("suggestion".into(), json!(suggestion));
        }
        details
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::database(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::database(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => DbError::connection(
                "Timed out waiting for a pooled connection",
                "The pool is exhausted; retry later or raise --pool-max-size",
            ),
            sqlx::Error::PoolClosed => DbError::connection(
                "Connection pool is closed",
                "The server is shutting down",
            ),
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify the sslmode setting and server certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

impl From<std::io::Error> for DbError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_error_suggestion() {
        let err = DbError::database(
            "Syntax error",
            Some("42601".to_string()),
            "Check SQL syntax",
        );
        assert_eq!(err.suggestion(), Some("Check SQL syntax"));
    }

    #[test]
    fn test_error_retryable() {
        assert!(DbError::timeout("query", 30).is_retryable());
        assert!(DbError::connection("err", "sugg").is_retryable());
        assert!(!DbError::invalid_input("bad").is_retryable());
        assert!(!DbError::process("pg_dump", "exit 1").is_retryable());
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(DbError::invalid_input("x").kind(), "validation_error");
        assert_eq!(DbError::connection("x", "y").kind(), "connection_error");
        assert_eq!(DbError::database("x", None, "y").kind(), "statement_error");
        assert_eq!(DbError::process("psql", "x").kind(), "process_error");
        assert_eq!(DbError::timeout("x", 1).kind(), "timeout_error");
        assert_eq!(
            DbError::partial_failure("x", 1, 11, vec![]).kind(),
            "partial_failure"
        );
    }

    #[test]
    fn test_process_output_drops_empty_streams() {
        let err = DbError::process_output("pg_dump", "exit status 1", "fatal: no db", "");
        let details = err.details();
        assert_eq!(details["stderr"], "fatal: no db");
        assert!(!details.contains_key("stdout"));
    }

    #[test]
    fn test_partial_failure_details() {
        let err = DbError::partial_failure(
            "Too many errors during restore (11)",
            4,
            11,
            vec!["Error executing statement 2: boom".to_string()],
        );
        let details = err.details();
        assert_eq!(details["statements_executed"], 4);
        assert_eq!(details["errors"], 11);
        assert_eq!(details["warnings"][0], "Error executing statement 2: boom");
        assert!(!details.contains_key("first_error"));
    }

    #[test]
    fn test_partial_failure_reports_first_error() {
        let cause = DbError::database(
            "relation \"items\" does not exist",
            Some("42P01".to_string()),
            "check objects",
        );
        let err = DbError::partial_failure("Too many errors during restore (11)", 0, 11, vec![])
            .with_first_error(cause);
        assert_eq!(err.kind(), "partial_failure");
        let first = &err.details()["first_error"];
        assert_eq!(first["kind"], "statement_error");
        assert_eq!(first["sql_state"], "42P01");
        assert!(first["message"].as_str().unwrap().contains("items"));

        let unchanged = DbError::not_found("x").with_first_error(DbError::internal("y"));
        assert_eq!(unchanged.kind(), "not_found");
    }

    #[test]
    fn test_database_details_include_sql_state_and_suggestion() {
        let err = DbError::database("syntax error", Some("42601".to_string()), "check syntax");
        let details = err.details();
        assert_eq!(details["sql_state"], "42601");
        assert_eq!(details["suggestion"], "check syntax");
    }

    #[test]
    fn test_pool_timeout_is_connection_error() {
        let err: DbError = sqlx::Error::PoolTimedOut.into();
        assert_eq!(err.kind(), "connection_error");
    }

    #[test]
    fn test_io_error_conversion() {
        let err: DbError = std::io::Error::new(std::io::ErrorKind::NotFound, "missing").into();
        assert_eq!(err.kind(), "io_error");
        assert!(err.to_string().contains("missing"));
    }
}
