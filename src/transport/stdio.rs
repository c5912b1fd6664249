//! Stdio transport.
//!
//! JSON-RPC frames arrive on stdin and responses leave on stdout, the usual
//! arrangement for editor and desktop MCP clients. All logging goes to
//! stderr so the protocol stream stays clean.

use crate::db::QueryEngine;
use crate::error::{DbError, DbResult};
use crate::mcp::MssqlService;
use crate::transport::{Transport, wait_for_signal};
use rmcp::{ServiceExt, transport::stdio};
use std::sync::Arc;
use tracing::{info, warn};

/// Serves the MCP protocol over the process's standard streams.
pub struct StdioTransport {
    engine: Arc<QueryEngine>,
}

impl StdioTransport {
    pub fn new(engine: Arc<QueryEngine>) -> Self {
        Self { engine }
    }
}

impl Transport for StdioTransport {
    async fn run(&self) -> DbResult<()> {
        info!("Serving MCP over stdio");

        let service = MssqlService::new(self.engine.clone());
        let running = service
            .serve(stdio())
            .await
            .map_err(|e| DbError::internal(format!("stdio transport failed to start: {e}")))?;

        let signalled = tokio::select! {
            result = running.waiting() => {
                if let Err(e) = result {
                    warn!(error = %e, "Stdio serve loop failed");
                    return Err(DbError::internal(format!("stdio transport failed: {e}")));
                }
                info!("Stdio session ended");
                false
            }
            _ = wait_for_signal() => {
                info!("Shutdown signal received, send again to force exit");
                true
            }
        };

        if signalled {
            tokio::spawn(async {
                wait_for_signal().await;
                warn!("Second signal received, exiting immediately");
                std::process::exit(1);
            });
        }

        info!("Draining connection pool");
        self.engine.pool().close_all().await;

        if signalled {
            // The blocked stdin read cannot be cancelled, so shutdown after a
            // signal has to end the process explicitly.
            info!("Exiting");
            std::process::exit(0);
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "stdio"
    }
}
