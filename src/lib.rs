//! MSSQL MCP Server Library
//!
//! This library provides MCP (Model Context Protocol) tools for AI assistants
//! to interact with Microsoft SQL Server: admission-controlled query
//! execution over a bounded connection pool, schema introspection, and
//! gated write/stored-procedure support.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod mcp;
pub mod models;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::DbError;
pub use mcp::MssqlService;
