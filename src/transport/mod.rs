//! Transports carrying the MCP protocol stream.
//!
//! Two are available: stdio for editor and CLI integrations, and HTTP with
//! streaming responses for networked clients. Both own the full serve loop
//! including signal-driven shutdown and pool teardown.

pub mod http;
pub mod stdio;

pub use http::HttpTransport;
pub use stdio::StdioTransport;

use crate::error::DbResult;
use std::future::Future;
use tokio::signal;
use tracing::info;

/// A way of serving the MCP protocol to clients.
pub trait Transport: Send + Sync {
    /// Serve until shutdown. Resolves only once the transport has stopped
    /// and the pool has been drained.
    fn run(&self) -> impl Future<Output = DbResult<()>> + Send;

    /// Short transport label for log lines.
    fn name(&self) -> &'static str;
}

/// Resolves when the process receives SIGINT or SIGTERM.
pub(crate) async fn wait_for_signal() {
    let interrupt = async {
        signal::ctrl_c().await.expect("SIGINT handler failed");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler failed")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
