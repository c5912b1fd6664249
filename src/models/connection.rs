//! Connection configuration models.
//!
//! Settings parsed by the CLI layer are projected into two read-only views:
//! one for the TDS driver, one for the pool. Both are fixed at startup and
//! shared freely afterwards.

use std::time::Duration;

/// Driver-facing connection settings for one SQL Server endpoint.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    /// Initial database context for new sessions.
    pub database: String,
    pub user: String,
    pub password: String,
    /// Require TLS encryption on the wire.
    pub encrypt: bool,
    /// Accept the server certificate without CA validation.
    pub trust_server_certificate: bool,
    /// Ceiling for TCP connect + TDS handshake.
    pub connect_timeout: Duration,
}

impl ConnectionSettings {
    /// Display-safe endpoint description (no credentials).
    pub fn endpoint(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }

    /// Display-safe summary for logs, credentials masked.
    pub fn masked_summary(&self) -> String {
        format!(
            "server={}:{} database={} user={} password=****",
            self.host, self.port, self.database, self.user
        )
    }
}

/// Pool sizing and lifetime settings.
#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    /// Connections created at warm-up.
    pub min_size: usize,
    /// Hard ceiling on live connections (idle + on loan).
    pub max_size: usize,
    /// Configured idle cutoff. Carried but not enforced; eviction is lazy
    /// and driven by `max_lifetime` alone.
    pub idle_timeout: Duration,
    /// Maximum age of a connection before it is replaced on pull.
    pub max_lifetime: Duration,
}
