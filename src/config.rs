//! Configuration handling for the PostgreSQL MCP Server.
//!
//! This module provides configuration management via CLI arguments and environment variables.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_MCP_ENDPOINT: &str = "/";
pub const DEFAULT_PG_PORT: u16 = 5432;
pub const DEFAULT_PG_SSLMODE: &str = "require";
pub const DEFAULT_TOKEN_REFRESH_MARGIN_SECS: u64 = 300;
pub const DEFAULT_MAINTENANCE_DATABASE: &str = "postgres";
pub const DEFAULT_BACKUP_DIR: &str = "backups";

// Pool configuration defaults
pub const DEFAULT_POOL_MIN_SIZE: u32 = 2;
pub const DEFAULT_POOL_MAX_SIZE: u32 = 10;
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;
/// Upper bound on pooled connection idle time and lifetime in token mode.
pub const TOKEN_MODE_CONNECTION_LIFETIME_SECS: u64 = 1800;

/// How connections to PostgreSQL are authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum AuthType {
    /// Static credentials taken from DATABASE_URL
    #[default]
    #[value(name = "postgresql")]
    Postgresql,
    /// Short-lived Microsoft Entra ID access token used as the password
    #[value(name = "entraid")]
    EntraId,
}

impl std::fmt::Display for AuthType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Postgresql => write!(f, "postgresql"),
            Self::EntraId => write!(f, "entraid"),
        }
    }
}

/// Transport mode for the MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TransportMode {
    /// Standard input/output (for CLI integration)
    #[default]
    Stdio,
    /// HTTP with Server-Sent Events (for web clients)
    Http,
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Http => write!(f, "http"),
        }
    }
}

/// Connection pool bounds and timeouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    pub min_size: u32,
    pub max_size: u32,
    pub command_timeout: Duration,
    pub acquire_timeout: Duration,
    /// Bounded idle time / lifetime for pooled connections. `None` keeps sqlx defaults.
    pub max_connection_lifetime: Option<Duration>,
}

impl PoolSettings {
    /// Validate pool options and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_size == 0 {
            return Err("pool max size must be greater than 0".to_string());
        }
        if self.min_size > self.max_size {
            return Err(format!(
                "pool min size ({}) cannot exceed max size ({})",
                self.min_size, self.max_size
            ));
        }
        if self.command_timeout.is_zero() {
            return Err("command timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            min_size: DEFAULT_POOL_MIN_SIZE,
            max_size: DEFAULT_POOL_MAX_SIZE,
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
            max_connection_lifetime: None,
        }
    }
}

/// Configuration for the PostgreSQL MCP Server.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "pg-mcp-server",
    about = "MCP server for PostgreSQL - DDL, DML, transactions, backup/restore and schema introspection",
    version,
    author
)]
pub struct Config {
    /// Authentication mode: postgresql (static DATABASE_URL) or entraid (refreshed access token)
    #[arg(long, value_enum, default_value = "postgresql", env = "AUTH_TYPE")]
    pub auth_type: AuthType,

    /// Default database connection string (postgresql auth mode)
    #[arg(long, value_name = "URL", env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Database host (entraid auth mode)
    #[arg(long, env = "PG_HOST")]
    pub pg_host: Option<String>,

    /// Database port (entraid auth mode)
    #[arg(long, default_value_t = DEFAULT_PG_PORT, env = "PG_PORT")]
    pub pg_port: u16,

    /// Default database name (entraid auth mode)
    #[arg(long, env = "PG_DATABASE")]
    pub pg_database: Option<String>,

    /// Database user, typically the Entra ID principal name (entraid auth mode)
    #[arg(long, env = "PG_USER")]
    pub pg_user: Option<String>,

    /// TLS mode (entraid auth mode)
    #[arg(long, default_value = DEFAULT_PG_SSLMODE, env = "PG_SSLMODE")]
    pub pg_sslmode: String,

    /// Refresh access tokens this many seconds before they expire
    #[arg(long, default_value_t = DEFAULT_TOKEN_REFRESH_MARGIN_SECS, env = "TOKEN_REFRESH_MARGIN")]
    pub token_refresh_margin: u64,

    /// Entra ID tenant for the service principal flow
    #[arg(long, env = "AZURE_TENANT_ID")]
    pub azure_tenant_id: Option<String>,

    /// Entra ID application (client) id for the service principal flow
    #[arg(long, env = "AZURE_CLIENT_ID")]
    pub azure_client_id: Option<String>,

    /// Entra ID client secret for the service principal flow
    #[arg(long, env = "AZURE_CLIENT_SECRET", hide_env_values = true)]
    pub azure_client_secret: Option<String>,

    /// Minimum pooled connections
    #[arg(long, default_value_t = DEFAULT_POOL_MIN_SIZE, env = "PG_POOL_MIN_SIZE")]
    pub pool_min_size: u32,

    /// Maximum pooled connections
    #[arg(long, default_value_t = DEFAULT_POOL_MAX_SIZE, env = "PG_POOL_MAX_SIZE")]
    pub pool_max_size: u32,

    /// Per-command timeout in seconds
    #[arg(long, default_value_t = DEFAULT_COMMAND_TIMEOUT_SECS, env = "PG_COMMAND_TIMEOUT")]
    pub command_timeout: u64,

    /// Maximum wait for a pooled connection in seconds
    #[arg(long, default_value_t = DEFAULT_ACQUIRE_TIMEOUT_SECS, env = "PG_ACQUIRE_TIMEOUT")]
    pub acquire_timeout: u64,

    /// Database used for CREATE/DROP DATABASE connections
    #[arg(long, default_value = DEFAULT_MAINTENANCE_DATABASE, env = "PG_MAINTENANCE_DATABASE")]
    pub maintenance_database: String,

    /// Directory used by backup_database and list_backups when no path is given
    #[arg(long, default_value = DEFAULT_BACKUP_DIR, env = "DEFAULT_BACKUP_DIR")]
    pub default_backup_dir: PathBuf,

    /// Transport mode (stdio or http)
    #[arg(
        short,
        long,
        value_enum,
        default_value = "stdio",
        env = "MCP_TRANSPORT"
    )]
    pub transport: TransportMode,

    /// HTTP host to bind to (only used with http transport)
    #[arg(
        long,
        default_value = DEFAULT_HTTP_HOST,
        env = "MCP_HTTP_HOST"
    )]
    pub http_host: String,

    /// HTTP port to bind to (only used with http transport)
    #[arg(
        long,
        default_value_t = DEFAULT_HTTP_PORT,
        env = "MCP_HTTP_PORT"
    )]
    pub http_port: u16,

    /// MCP endpoint path (only used with http transport)
    #[arg(
        long,
        default_value = DEFAULT_MCP_ENDPOINT,
        env = "MCP_ENDPOINT"
    )]
    pub mcp_endpoint: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "MCP_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "MCP_JSON_LOGS")]
    pub json_logs: bool,

    /// Enable logging output (disabled by default to avoid interfering with stdio transport)
    #[arg(long, env = "MCP_ENABLE_LOGS")]
    pub enable_logs: bool,

    /// Authentication tokens for HTTP transport.
    /// Can be specified multiple times or as comma-separated values.
    /// When set, all HTTP requests must include a valid Bearer token.
    #[arg(
        long = "auth-token",
        value_name = "TOKEN",
        env = "MCP_AUTH_TOKENS",
        value_delimiter = ',',
        hide_env_values = true
    )]
    pub auth_tokens: Vec<String>,
}

impl Config {
    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            auth_type: AuthType::Postgresql,
            database_url: None,
            pg_host: None,
            pg_port: DEFAULT_PG_PORT,
            pg_database: None,
            pg_user: None,
            pg_sslmode: DEFAULT_PG_SSLMODE.to_string(),
            token_refresh_margin: DEFAULT_TOKEN_REFRESH_MARGIN_SECS,
            azure_tenant_id: None,
            azure_client_id: None,
            azure_client_secret: None,
            pool_min_size: DEFAULT_POOL_MIN_SIZE,
            pool_max_size: DEFAULT_POOL_MAX_SIZE,
            command_timeout: DEFAULT_COMMAND_TIMEOUT_SECS,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT_SECS,
            maintenance_database: DEFAULT_MAINTENANCE_DATABASE.to_string(),
            default_backup_dir: PathBuf::from(DEFAULT_BACKUP_DIR),
            transport: TransportMode::Stdio,
            http_host: DEFAULT_HTTP_HOST.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            mcp_endpoint: DEFAULT_MCP_ENDPOINT.to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            enable_logs: false,
            auth_tokens: Vec::new(),
        }
    }

    /// Check that the selected auth mode has everything it needs.
    pub fn validate(&self) -> Result<(), String> {
        match self.auth_type {
            AuthType::Postgresql => {
                if self.database_url.as_deref().is_none_or(str::is_empty) {
                    return Err(
                        "DATABASE_URL is required for postgresql authentication".to_string()
                    );
                }
            }
            AuthType::EntraId => {
                let mut missing = Vec::new();
                if self.pg_host.is_none() {
                    missing.push("PG_HOST");
                }
                if self.pg_database.is_none() {
                    missing.push("PG_DATABASE");
                }
                if self.pg_user.is_none() {
                    missing.push("PG_USER");
                }
                if self.azure_client_id.is_some() && self.azure_client_secret.is_none() {
                    missing.push("AZURE_CLIENT_SECRET");
                }
                if self.azure_client_secret.is_some() && self.azure_tenant_id.is_none() {
                    missing.push("AZURE_TENANT_ID");
                }
                if !missing.is_empty() {
                    return Err(format!(
                        "Missing required settings for entraid authentication: {}",
                        missing.join(", ")
                    ));
                }
            }
        }
        if self.maintenance_database.trim().is_empty() {
            return Err("maintenance database name cannot be empty".to_string());
        }
        self.pool_settings().validate()
    }

    /// Pool settings derived from the CLI values and the auth mode.
    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            min_size: self.pool_min_size,
            max_size: self.pool_max_size,
            command_timeout: Duration::from_secs(self.command_timeout),
            acquire_timeout: Duration::from_secs(self.acquire_timeout),
            max_connection_lifetime: match self.auth_type {
                AuthType::EntraId => Some(Duration::from_secs(
                    TOKEN_MODE_CONNECTION_LIFETIME_SECS,
                )),
                AuthType::Postgresql => None,
            },
        }
    }

    /// Get the HTTP bind address.
    pub fn http_bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }

    pub fn token_refresh_margin_duration(&self) -> Duration {
        Duration::from_secs(self.token_refresh_margin)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entraid_config() -> Config {
        Config {
            auth_type: AuthType::EntraId,
            pg_host: Some("myserver.postgres.database.azure.com".to_string()),
            pg_database: Some("appdb".to_string()),
            pg_user: Some("app-identity".to_string()),
            ..Config::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.transport, TransportMode::Stdio);
        assert_eq!(config.auth_type, AuthType::Postgresql);
        assert_eq!(config.pg_port, 5432);
        assert_eq!(config.pg_sslmode, "require");
        assert_eq!(config.token_refresh_margin, 300);
        assert_eq!(config.maintenance_database, "postgres");
    }

    #[test]
    fn test_http_bind_addr() {
        let config = Config {
            http_host: "0.0.0.0".to_string(),
            http_port: 3000,
            ..Config::default()
        };
        assert_eq!(config.http_bind_addr(), "0.0.0.0:3000");
    }

    #[test]
    fn test_postgresql_mode_requires_database_url() {
        let config = Config::default();
        let err = config.validate().unwrap_err();
        assert!(err.contains("DATABASE_URL"));

        let config = Config {
            database_url: Some("postgres://u:p@localhost:5432/app".to_string()),
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_entraid_mode_lists_missing_settings() {
        let config = Config {
            auth_type: AuthType::EntraId,
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.contains("PG_HOST"));
        assert!(err.contains("PG_DATABASE"));
        assert!(err.contains("PG_USER"));
        assert!(entraid_config().validate().is_ok());
    }

    #[test]
    fn test_entraid_client_id_requires_secret() {
        let config = Config {
            azure_client_id: Some("client".to_string()),
            ..entraid_config()
        };
        assert!(config.validate().unwrap_err().contains("AZURE_CLIENT_SECRET"));
    }

    #[test]
    fn test_pool_settings_lifetime_depends_on_auth_mode() {
        let static_mode = Config::default().pool_settings();
        assert_eq!(static_mode.max_connection_lifetime, None);
        assert_eq!(static_mode.min_size, 2);
        assert_eq!(static_mode.max_size, 10);
        assert_eq!(static_mode.command_timeout, Duration::from_secs(60));

        let token_mode = entraid_config().pool_settings();
        assert_eq!(
            token_mode.max_connection_lifetime,
            Some(Duration::from_secs(1800))
        );
    }

    #[test]
    fn test_pool_settings_validation() {
        let settings = PoolSettings {
            min_size: 5,
            max_size: 2,
            ..PoolSettings::default()
        };
        assert!(settings.validate().is_err());

        let settings = PoolSettings {
            max_size: 0,
            min_size: 0,
            ..PoolSettings::default()
        };
        assert!(settings.validate().is_err());
        assert!(PoolSettings::default().validate().is_ok());
    }

    #[test]
    fn test_parse_from_args() {
        let config = Config::parse_from([
            "pg-mcp-server",
            "--auth-type",
            "entraid",
            "--pg-host",
            "db.example.com",
            "--pg-database",
            "app",
            "--pg-user",
            "svc",
            "--pool-max-size",
            "4",
        ]);
        assert_eq!(config.auth_type, AuthType::EntraId);
        assert_eq!(config.pool_max_size, 4);
        assert!(config.validate().is_ok());
    }
}
