//! Database access layer.
//!
//! This module provides everything between the MCP tools and the server:
//! - Driver traits decoupling the pool and engine from tiberius
//! - Statement validation and admission control
//! - Bounded connection pool with health-checked reuse
//! - Query execution engine producing structured outcomes
//! - The tiberius-backed MSSQL driver implementation

pub mod driver;
pub mod executor;
pub mod mssql;
pub mod pool;
pub mod validator;

pub use driver::{Connector, Cursor, Session};
pub use executor::QueryEngine;
pub use mssql::MssqlConnector;
pub use pool::{ConnectionPool, PoolGuard, PoolStats};
