//! Query execution tool.
//!
//! This module implements the `mssql_query` MCP tool. Statements pass through
//! admission control before execution: in read-only deployments only
//! SELECT/CTE statements are admitted, and multi-statement batches are always
//! rejected.

use crate::db::QueryEngine;
use crate::models::{QueryOutcome, DEFAULT_MAX_ROWS};
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;

fn default_max_rows() -> usize {
    DEFAULT_MAX_ROWS
}

/// Input for the mssql_query tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct QueryInput {
    /// SQL statement to execute. SELECT only unless write operations are enabled.
    pub query: String,
    /// Database to run against. Defaults to the connection's database.
    #[serde(default)]
    pub database: Option<String>,
    /// Maximum number of rows to return. Default: 1000
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
}

/// Handler for query execution.
pub struct QueryToolHandler {
    engine: Arc<QueryEngine>,
}

impl QueryToolHandler {
    pub fn new(engine: Arc<QueryEngine>) -> Self {
        Self { engine }
    }

    /// Handle the mssql_query tool call.
    ///
    /// Rejections and execution failures come back as failure outcomes, never
    /// as errors; the caller always gets a serializable payload.
    pub async fn query(&self, input: QueryInput) -> QueryOutcome {
        self.engine
            .run_query(&input.query, input.database.as_deref(), input.max_rows)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_input_defaults() {
        let json = r#"{"query": "SELECT 1"}"#;
        let input: QueryInput = serde_json::from_str(json).unwrap();
        assert_eq!(input.query, "SELECT 1");
        assert_eq!(input.database, None);
        assert_eq!(input.max_rows, 1000);
    }

    #[test]
    fn test_query_input_explicit_fields() {
        let json = r#"{
            "query": "SELECT name FROM sys.tables",
            "database": "Sales",
            "max_rows": 50
        }"#;
        let input: QueryInput = serde_json::from_str(json).unwrap();
        assert_eq!(input.database.as_deref(), Some("Sales"));
        assert_eq!(input.max_rows, 50);
    }
}
