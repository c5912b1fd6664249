//! Data models for the MSSQL MCP Server.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod query;

// Re-export commonly used types
pub use connection::{ConnectionSettings, PoolSettings};
pub use query::{
    DEFAULT_MAX_ROWS, DEFAULT_PROCEDURE_TIMEOUT_SECS, MAX_PROCEDURE_TIMEOUT_SECS,
    ProcedureOutcome, QueryOutcome, ResultSetBlock, Row, STATEMENT_ECHO_LIMIT, SqlParam,
    WriteOutcome, truncate_statement,
};
