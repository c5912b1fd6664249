//! HTTP transport.
//!
//! Exposes the MCP protocol as a streamable HTTP endpoint (SSE responses on
//! long-lived requests), for clients that talk to the server over the
//! network. When bearer tokens are configured every request goes through
//! the authentication middleware before reaching the service.

use crate::auth::{AuthConfig, auth_middleware};
use crate::db::QueryEngine;
use crate::error::{DbError, DbResult};
use crate::mcp::MssqlService;
use crate::transport::{Transport, wait_for_signal};
use rmcp::transport::streamable_http_server::{
    StreamableHttpService, session::local::LocalSessionManager,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Streaming connections can outlive a graceful shutdown indefinitely, so
/// the drain phase is capped before the server future is dropped.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Serves the MCP protocol over HTTP with streaming responses.
pub struct HttpTransport {
    engine: Arc<QueryEngine>,
    auth: Arc<AuthConfig>,
    host: String,
    port: u16,
    /// Path the MCP service is mounted under.
    endpoint: String,
}

impl HttpTransport {
    pub fn new(
        engine: Arc<QueryEngine>,
        auth: AuthConfig,
        host: impl Into<String>,
        port: u16,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            auth: Arc::new(auth),
            host: host.into(),
            port,
            endpoint: endpoint.into(),
        }
    }

    /// Socket address the listener binds to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Path the MCP service is mounted under.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Transport for HttpTransport {
    async fn run(&self) -> DbResult<()> {
        let bind_addr = self.bind_addr();
        info!(addr = %bind_addr, "Serving MCP over HTTP");

        let engine = self.engine.clone();
        let service = StreamableHttpService::new(
            move || Ok(MssqlService::new(engine.clone())),
            LocalSessionManager::default().into(),
            Default::default(),
        );

        // axum's nest_service rejects a bare "/", so the root path mounts
        // the service as the fallback instead.
        let mut app = if self.endpoint == "/" {
            axum::Router::new().fallback_service(service)
        } else {
            axum::Router::new().nest_service(&self.endpoint, service)
        };

        if self.auth.is_enabled() {
            info!(tokens = self.auth.token_count(), "Bearer authentication enabled");
            app = app.layer(axum::middleware::from_fn_with_state(
                self.auth.clone(),
                auth_middleware,
            ));
        } else {
            warn!("HTTP transport running without authentication");
        }

        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            DbError::connection(
                format!("Could not bind {bind_addr}: {e}"),
                "Pick a free port or stop the process holding this one",
            )
        })?;

        info!(endpoint = %self.endpoint, "Listening for MCP clients");

        let shutdown = Arc::new(tokio::sync::Notify::new());
        let notify = shutdown.clone();
        let shutdown_signal = async move {
            wait_for_signal().await;
            notify.notify_one();
        };

        let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal);

        tokio::select! {
            result = server => {
                if let Err(e) = result {
                    error!(error = %e, "HTTP serve loop failed");
                    return Err(DbError::internal(format!("HTTP transport failed: {e}")));
                }
                info!("HTTP server stopped");
            }
            _ = async {
                shutdown.notified().await;
                info!(
                    grace_secs = SHUTDOWN_GRACE.as_secs(),
                    "Draining open connections, send signal again to force exit"
                );
                tokio::select! {
                    _ = tokio::time::sleep(SHUTDOWN_GRACE) => {
                        warn!("Drain grace period elapsed, dropping remaining connections");
                    }
                    _ = wait_for_signal() => {
                        warn!("Second signal received, dropping remaining connections");
                    }
                }
            } => {}
        }

        info!("Draining connection pool");
        self.engine.pool().close_all().await;

        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
