//! HTTP transport with Streamable HTTP support for the MCP server.
//!
//! This transport uses HTTP with SSE streaming responses,
//! which is suitable for web-based MCP integrations.

use crate::auth::{AuthConfig, auth_middleware};
use crate::db::PoolManager;
use crate::error::{DbError, DbResult};
use crate::mcp::PgService;
use crate::tools::ToolDispatcher;
use crate::transport::{Transport, wait_for_signal};
use rmcp::transport::streamable_http_server::{
    StreamableHttpService, session::local::LocalSessionManager,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP transport implementation with Streamable HTTP support.
///
/// This transport provides:
/// - HTTP endpoints for MCP protocol messages
/// - Server-Sent Events for streaming responses
/// - Session management for stateful connections
/// - Bearer token checks when tokens are configured
pub struct HttpTransport {
    dispatcher: Arc<ToolDispatcher>,
    pool: Arc<PoolManager>,
    auth: Arc<AuthConfig>,
    host: String,
    port: u16,
    endpoint: String,
}

impl HttpTransport {
    /// Create a new HTTP transport.
    ///
    /// # Arguments
    ///
    /// * `dispatcher` - Shared tool dispatcher
    /// * `pool` - Pool closed on shutdown
    /// * `host` - Host address to bind to
    /// * `port` - Port to bind to
    /// * `endpoint` - MCP endpoint path (e.g., "/mcp")
    pub fn new(
        dispatcher: Arc<ToolDispatcher>,
        pool: Arc<PoolManager>,
        host: impl Into<String>,
        port: u16,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            dispatcher,
            pool,
            auth: Arc::new(AuthConfig::disabled()),
            host: host.into(),
            port,
            endpoint: endpoint.into(),
        }
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = Arc::new(auth);
        self
    }

    /// Get the bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the MCP endpoint path.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn auth_enabled(&self) -> bool {
        self.auth.is_enabled()
    }

    fn router(&self) -> axum::Router {
        let dispatcher = self.dispatcher.clone();
        let service = StreamableHttpService::new(
            move || Ok(PgService::new(dispatcher.clone())),
            LocalSessionManager::default().into(),
            Default::default(),
        );

        // nest_service does not accept the root path
        let app = if self.endpoint == "/" {
            axum::Router::new().fallback_service(service)
        } else {
            axum::Router::new().nest_service(&self.endpoint, service)
        };

        if self.auth.is_enabled() {
            app.layer(axum::middleware::from_fn_with_state(
                self.auth.clone(),
                auth_middleware,
            ))
        } else {
            app
        }
    }
}

impl Transport for HttpTransport {
    async fn run(&self) -> DbResult<()> {
        let bind_addr = self.bind_addr();
        info!("Starting MCP server with HTTP transport on {}", bind_addr);

        let app = self.router();

        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            DbError::connection(
                format!("Failed to bind to {}: {}", bind_addr, e),
                "Check that the port is available",
            )
        })?;

        if self.auth.is_enabled() {
            info!(
                tokens = self.auth.token_count(),
                "Bearer token authentication enabled"
            );
        } else {
            warn!("HTTP transport running without authentication");
        }
        info!(endpoint = %self.endpoint, "MCP endpoint ready");

        // SSE streams can keep the server alive indefinitely after shutdown starts
        let shutdown_notify = Arc::new(tokio::sync::Notify::new());
        let shutdown_notify_clone = shutdown_notify.clone();

        let shutdown_signal = async move {
            wait_for_signal().await;
            shutdown_notify_clone.notify_one();
        };

        let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal);

        let outcome = tokio::select! {
            result = server => {
                match result {
                    Ok(()) => {
                        info!("HTTP server stopped");
                        Ok(())
                    }
                    Err(e) => {
                        error!(error = %e, "HTTP server error");
                        Err(DbError::internal(format!("HTTP server error: {}", e)))
                    }
                }
            }
            _ = async {
                shutdown_notify.notified().await;
                info!(
                    timeout_secs = GRACEFUL_TIMEOUT.as_secs(),
                    "Waiting for connections to close (send signal again to force exit)..."
                );

                tokio::select! {
                    _ = tokio::time::sleep(GRACEFUL_TIMEOUT) => {
                        warn!("Graceful shutdown timeout, forcing exit");
                    }
                    _ = wait_for_signal() => {
                        warn!("Received second signal, forcing immediate exit");
                    }
                }
            } => Ok(())
        };

        info!("Closing database pool");
        self.pool.close().await;

        outcome
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolSettings;
    use crate::db::StaticCredential;

    fn transport(host: &str, port: u16, endpoint: &str) -> HttpTransport {
        let provider =
            Arc::new(StaticCredential::from_url("postgres://u:p@localhost/app").unwrap());
        let pool = Arc::new(PoolManager::new(provider, PoolSettings::default(), "postgres"));
        let dispatcher = Arc::new(ToolDispatcher::new(pool.clone(), "backups"));
        HttpTransport::new(dispatcher, pool, host, port, endpoint)
    }

    #[test]
    fn test_http_transport_creation() {
        let transport = transport("127.0.0.1", 8080, "/mcp");
        assert_eq!(transport.name(), "http");
        assert_eq!(transport.bind_addr(), "127.0.0.1:8080");
        assert!(!transport.auth_enabled());
    }

    #[test]
    fn test_http_transport_custom_endpoint() {
        let transport = transport("0.0.0.0", 3000, "/custom/path");
        assert_eq!(transport.bind_addr(), "0.0.0.0:3000");
        assert_eq!(transport.endpoint(), "/custom/path");
    }

    #[test]
    fn test_http_transport_with_auth() {
        let auth = AuthConfig::from_tokens(vec!["abc123".into()]).unwrap();
        let transport = transport("127.0.0.1", 8080, "/").with_auth(auth);
        assert!(transport.auth_enabled());
        assert_eq!(transport.endpoint(), "/");
    }
}
