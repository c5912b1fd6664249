//! Configuration handling for the MSSQL MCP Server.
//!
//! Everything is settable both as a CLI flag and as an environment
//! variable; the environment keys follow the conventional MSSQL_* names so
//! the server drops into existing deployments without renaming anything.

use crate::models::{ConnectionSettings, PoolSettings};
use clap::{Parser, ValueEnum};
use std::time::Duration;

pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_MCP_ENDPOINT: &str = "/";

// SQL Server connection defaults
pub const DEFAULT_MSSQL_HOST: &str = "localhost";
pub const DEFAULT_MSSQL_PORT: u16 = 1433;
pub const DEFAULT_MSSQL_DATABASE: &str = "master";
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 30;

// Pool configuration defaults
pub const DEFAULT_MIN_POOL_SIZE: usize = 2;
pub const DEFAULT_MAX_POOL_SIZE: usize = 10;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_CONNECTION_LIFETIME_SECS: u64 = 1800;

/// How the MCP protocol reaches clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TransportMode {
    /// Standard input/output, for editor and CLI clients
    #[default]
    Stdio,
    /// HTTP with streaming responses, for networked clients
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

/// Configuration for the MSSQL MCP Server.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "mssql-mcp-server",
    about = "MCP server for Microsoft SQL Server - pooled, validated query access for AI assistants",
    version,
    author
)]
pub struct Config {
    /// SQL Server hostname
    #[arg(long, default_value = DEFAULT_MSSQL_HOST, env = "MSSQL_HOST")]
    pub host: String,

    /// SQL Server TCP port
    #[arg(long, default_value_t = DEFAULT_MSSQL_PORT, env = "MSSQL_PORT")]
    pub port: u16,

    /// Default database context for new connections
    #[arg(long, default_value = DEFAULT_MSSQL_DATABASE, env = "MSSQL_DATABASE")]
    pub database: String,

    /// SQL login user
    #[arg(long, default_value = "sa", env = "MSSQL_USER")]
    pub user: String,

    /// SQL login password
    #[arg(long, default_value = "", env = "MSSQL_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Require TLS encryption on the wire
    #[arg(
        long,
        action = clap::ArgAction::Set,
        default_value_t = true,
        env = "MSSQL_ENCRYPT"
    )]
    pub encrypt: bool,

    /// Accept the server certificate without CA validation
    #[arg(
        long,
        action = clap::ArgAction::Set,
        default_value_t = false,
        env = "MSSQL_TRUST_SERVER_CERTIFICATE"
    )]
    pub trust_server_certificate: bool,

    /// Seconds allowed for TCP connect plus TDS handshake
    #[arg(
        long,
        default_value_t = DEFAULT_CONNECTION_TIMEOUT_SECS,
        env = "MSSQL_CONNECTION_TIMEOUT"
    )]
    pub connection_timeout: u64,

    /// Connections created at startup
    #[arg(long, default_value_t = DEFAULT_MIN_POOL_SIZE, env = "MIN_POOL_SIZE")]
    pub min_pool_size: usize,

    /// Maximum live connections (idle + in use)
    #[arg(long, default_value_t = DEFAULT_MAX_POOL_SIZE, env = "MAX_POOL_SIZE")]
    pub max_pool_size: usize,

    /// Idle timeout in seconds (configured, eviction is lazy)
    #[arg(long, default_value_t = DEFAULT_IDLE_TIMEOUT_SECS, env = "IDLE_TIMEOUT")]
    pub idle_timeout: u64,

    /// Maximum connection lifetime in seconds before replacement
    #[arg(
        long,
        default_value_t = DEFAULT_CONNECTION_LIFETIME_SECS,
        env = "CONNECTION_LIFETIME"
    )]
    pub connection_lifetime: u64,

    /// Enable INSERT/UPDATE/DELETE and stored-procedure execution
    #[arg(
        long = "allow-write-operations",
        action = clap::ArgAction::Set,
        default_value_t = false,
        env = "MSSQL_ALLOW_WRITE_OPERATIONS"
    )]
    pub allow_write_operations: bool,

    /// Log filter level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    pub log_level: String,

    /// Emit log lines as JSON instead of human-readable text
    #[arg(long, env = "MCP_JSON_LOGS")]
    pub json_logs: bool,

    /// Transport carrying the MCP protocol (stdio or http)
    #[arg(
        short,
        long,
        value_enum,
        default_value = "stdio",
        env = "MCP_TRANSPORT"
    )]
    pub transport: TransportMode,

    /// Bind host for the http transport
    #[arg(long, default_value = DEFAULT_HTTP_HOST, env = "MCP_HTTP_HOST")]
    pub http_host: String,

    /// Bind port for the http transport
    #[arg(long, default_value_t = DEFAULT_HTTP_PORT, env = "MCP_HTTP_PORT")]
    pub http_port: u16,

    /// Path the MCP service is mounted under (http transport)
    #[arg(long, default_value = DEFAULT_MCP_ENDPOINT, env = "MCP_ENDPOINT")]
    pub mcp_endpoint: String,

    /// Bearer tokens accepted by the http transport. Repeat the flag or
    /// separate tokens with commas; configuring any token turns
    /// authentication on for every request.
    #[arg(
        long = "auth-token",
        value_name = "TOKEN",
        env = "MCP_AUTH_TOKENS",
        value_delimiter = ','
    )]
    pub auth_tokens: Vec<String>,
}

impl Config {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// All defaults, no environment or CLI input. Mostly for tests.
    pub fn default_config() -> Self {
        Self {
            host: DEFAULT_MSSQL_HOST.to_string(),
            port: DEFAULT_MSSQL_PORT,
            database: DEFAULT_MSSQL_DATABASE.to_string(),
            user: "sa".to_string(),
            password: String::new(),
            encrypt: true,
            trust_server_certificate: false,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT_SECS,
            min_pool_size: DEFAULT_MIN_POOL_SIZE,
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT_SECS,
            connection_lifetime: DEFAULT_CONNECTION_LIFETIME_SECS,
            allow_write_operations: false,
            log_level: "info".to_string(),
            json_logs: false,
            transport: TransportMode::Stdio,
            http_host: DEFAULT_HTTP_HOST.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            mcp_endpoint: DEFAULT_MCP_ENDPOINT.to_string(),
            auth_tokens: Vec::new(),
        }
    }

    /// Validate configuration values that clap cannot check on its own.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_pool_size == 0 {
            return Err("max_pool_size must be greater than 0".to_string());
        }
        if self.min_pool_size > self.max_pool_size {
            return Err(format!(
                "min_pool_size ({}) cannot exceed max_pool_size ({})",
                self.min_pool_size, self.max_pool_size
            ));
        }
        if self.password.is_empty() {
            return Err("MSSQL_PASSWORD is required".to_string());
        }
        Ok(())
    }

    /// Driver-facing connection settings.
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            host: self.host.clone(),
            port: self.port,
            database: self.database.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            encrypt: self.encrypt,
            trust_server_certificate: self.trust_server_certificate,
            connect_timeout: Duration::from_secs(self.connection_timeout),
        }
    }

    /// Pool sizing and lifetime settings.
    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            min_size: self.min_pool_size,
            max_size: self.max_pool_size,
            idle_timeout: Duration::from_secs(self.idle_timeout),
            max_lifetime: Duration::from_secs(self.connection_lifetime),
        }
    }

    /// Get the HTTP bind address.
    pub fn http_bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}
