//! Stdio transport for the MCP server.
//!
//! This transport uses standard input/output for communication,
//! which is the standard mode for CLI-based MCP integrations.

use crate::db::PoolManager;
use crate::error::{DbError, DbResult};
use crate::mcp::PgService;
use crate::tools::ToolDispatcher;
use crate::transport::{Transport, wait_for_signal};
use rmcp::{ServiceExt, transport::stdio};
use std::sync::Arc;
use tracing::{info, warn};

/// Stdio transport implementation.
///
/// Reads JSON-RPC messages from stdin and writes responses to stdout.
pub struct StdioTransport {
    dispatcher: Arc<ToolDispatcher>,
    pool: Arc<PoolManager>,
}

impl StdioTransport {
    /// `pool` is closed when the transport shuts down.
    pub fn new(dispatcher: Arc<ToolDispatcher>, pool: Arc<PoolManager>) -> Self {
        Self { dispatcher, pool }
    }
}

impl Transport for StdioTransport {
    async fn run(&self) -> DbResult<()> {
        info!("Starting MCP server with stdio transport");

        let service = PgService::new(self.dispatcher.clone());
        let running_service = service
            .serve(stdio())
            .await
            .map_err(|e| DbError::internal(format!("Failed to start stdio transport: {}", e)))?;

        let shutdown_requested = tokio::select! {
            result = running_service.waiting() => {
                match result {
                    Ok(_quit_reason) => {
                        info!("Stdio transport completed normally");
                    }
                    Err(e) => {
                        warn!(error = %e, "Stdio transport error");
                        self.pool.close().await;
                        return Err(DbError::internal(format!("Stdio transport error: {}", e)));
                    }
                }
                false
            }
            _ = wait_for_signal() => {
                info!("Shutdown signal received (send again to force exit)");
                true
            }
        };

        if shutdown_requested {
            tokio::spawn(async {
                wait_for_signal().await;
                warn!("Received second signal, forcing immediate exit");
                std::process::exit(1);
            });
        }

        info!("Closing database pool");
        self.pool.close().await;

        if shutdown_requested {
            // A blocking stdin read cannot be interrupted by select!
            info!("Exiting process");
            std::process::exit(0);
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "stdio"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolSettings;
    use crate::db::StaticCredential;

    #[test]
    fn test_stdio_transport_creation() {
        let provider =
            Arc::new(StaticCredential::from_url("postgres://u:p@localhost/app").unwrap());
        let pool = Arc::new(PoolManager::new(provider, PoolSettings::default(), "postgres"));
        let dispatcher = Arc::new(ToolDispatcher::new(pool.clone(), "backups"));
        let transport = StdioTransport::new(dispatcher, pool);
        assert_eq!(transport.name(), "stdio");
    }
}
