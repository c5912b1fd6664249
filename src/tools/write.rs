//! Write operation tool.
//!
//! This module implements the `mssql_execute_write` MCP tool for executing
//! INSERT, UPDATE, and DELETE statements. The tool is only usable when write
//! operations are enabled, and supports dry-run validation that never touches
//! the database.

use crate::db::QueryEngine;
use crate::models::WriteOutcome;
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;

/// Input for the mssql_execute_write tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExecuteWriteInput {
    /// DML statement to execute. Must start with INSERT, UPDATE, or DELETE.
    pub statement: String,
    /// Database to run against. Defaults to the connection's database.
    #[serde(default)]
    pub database: Option<String>,
    /// Validate the statement without executing it. Default: false
    #[serde(default)]
    pub dry_run: bool,
}

/// Handler for write execution.
pub struct WriteToolHandler {
    engine: Arc<QueryEngine>,
}

impl WriteToolHandler {
    pub fn new(engine: Arc<QueryEngine>) -> Self {
        Self { engine }
    }

    /// Handle the mssql_execute_write tool call.
    pub async fn execute_write(&self, input: ExecuteWriteInput) -> WriteOutcome {
        self.engine
            .run_write(&input.statement, input.database.as_deref(), input.dry_run)
            .await
    }
}
