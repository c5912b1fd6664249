//! MSSQL MCP Server entry point.
//!
//! Wires configuration, the connection pool, the query engine, and the
//! selected transport together, then serves until shutdown.

use mssql_mcp_server::auth::AuthConfig;
use mssql_mcp_server::config::{Config, TransportMode};
use mssql_mcp_server::db::{ConnectionPool, MssqlConnector, QueryEngine};
use mssql_mcp_server::transport::{HttpTransport, StdioTransport, Transport};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Set up the tracing subscriber.
///
/// Logs always go to stderr: with the stdio transport, stdout carries the
/// MCP protocol stream and must stay clean.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse_args();

    init_tracing(&config);

    if let Err(message) = config.validate() {
        eprintln!("Error: {message}");
        eprintln!();
        eprintln!("Usage: mssql-mcp-server [OPTIONS]");
        eprintln!();
        eprintln!("Required settings:");
        eprintln!("  MSSQL_PASSWORD=<password>     SQL login password (or --password)");
        eprintln!();
        eprintln!("Common settings:");
        eprintln!("  MSSQL_HOST=localhost          Server hostname");
        eprintln!("  MSSQL_PORT=1433               Server port");
        eprintln!("  MSSQL_DATABASE=master         Default database");
        eprintln!("  MSSQL_USER=sa                 SQL login user");
        eprintln!("  MSSQL_ALLOW_WRITE_OPERATIONS  Enable writes (default: false)");
        std::process::exit(1);
    }

    let settings = config.connection_settings();
    info!(
        transport = %config.transport,
        server = %settings.masked_summary(),
        "Starting MSSQL MCP Server v{}",
        env!("CARGO_PKG_VERSION")
    );

    if config.allow_write_operations {
        warn!("Write operations are ENABLED: INSERT/UPDATE/DELETE and stored procedures are allowed");
    }

    // Create the pool and fill it to min_size before accepting requests
    let connector = MssqlConnector::new(settings);
    let pool = Arc::new(ConnectionPool::new(
        Box::new(connector),
        config.pool_settings(),
    ));
    pool.warm_up().await;

    let engine = Arc::new(QueryEngine::new(pool, config.allow_write_operations));

    let result = match config.transport {
        TransportMode::Stdio => {
            let transport = StdioTransport::new(engine);
            transport.run().await
        }
        TransportMode::Http => {
            let auth = AuthConfig::from_tokens(&config.auth_tokens)?;
            let transport = HttpTransport::new(
                engine,
                auth,
                &config.http_host,
                config.http_port,
                &config.mcp_endpoint,
            );
            transport.run().await
        }
    };

    if let Err(e) = result {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
