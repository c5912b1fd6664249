//! Stored procedure execution tool.
//!
//! This module implements the `mssql_execute_procedure` MCP tool. Named
//! parameters are bound positionally, every result set the procedure produces
//! is collected, and the whole call runs under a capped timeout.

use crate::db::QueryEngine;
use crate::models::{ProcedureOutcome, DEFAULT_PROCEDURE_TIMEOUT_SECS};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;

fn default_timeout() -> u64 {
    DEFAULT_PROCEDURE_TIMEOUT_SECS
}

/// Input for the mssql_execute_procedure tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExecuteProcedureInput {
    /// Procedure name, optionally schema-qualified (e.g. "dbo.GetOrders")
    pub procedure_name: String,
    /// Named parameters passed to the procedure
    #[serde(default)]
    pub parameters: Option<Map<String, JsonValue>>,
    /// Database to run against. Defaults to the connection's database.
    #[serde(default)]
    pub database: Option<String>,
    /// Execution timeout in seconds. Default: 30, maximum: 300
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

/// Handler for stored procedure execution.
pub struct ProcedureToolHandler {
    engine: Arc<QueryEngine>,
}

impl ProcedureToolHandler {
    pub fn new(engine: Arc<QueryEngine>) -> Self {
        Self { engine }
    }

    /// Handle the mssql_execute_procedure tool call.
    pub async fn execute_procedure(&self, input: ExecuteProcedureInput) -> ProcedureOutcome {
        let params = input.parameters.unwrap_or_default();
        self.engine
            .run_procedure(
                &input.procedure_name,
                &params,
                input.database.as_deref(),
                input.timeout,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_procedure_input_defaults() {
        let json = r#"{"procedure_name": "dbo.GetOrders"}"#;
        let input: ExecuteProcedureInput = serde_json::from_str(json).unwrap();
        assert_eq!(input.procedure_name, "dbo.GetOrders");
        assert!(input.parameters.is_none());
        assert_eq!(input.timeout, 30);
    }

    #[test]
    fn test_procedure_input_with_parameters() {
        let json = r#"{
            "procedure_name": "dbo.GetOrders",
            "parameters": {"CustomerId": 7, "Region": "west"},
            "timeout": 120
        }"#;
        let input: ExecuteProcedureInput = serde_json::from_str(json).unwrap();
        let params = input.parameters.unwrap();
        assert_eq!(params.get("CustomerId"), Some(&json!(7)));
        assert_eq!(params.get("Region"), Some(&json!("west")));
        assert_eq!(input.timeout, 120);
    }
}
