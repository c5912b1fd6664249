//! Query-related data models.
//!
//! This module defines parameter values and the structured outcomes returned
//! by the execution engine. Every outcome carries a `success` flag; failures
//! are reported inside the structure, never as raw errors.

use crate::error::{DbError, DbResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Default maximum number of rows returned by a query.
pub const DEFAULT_MAX_ROWS: usize = 1000;

/// Default stored-procedure timeout in seconds.
pub const DEFAULT_PROCEDURE_TIMEOUT_SECS: u64 = 30;

/// Ceiling for caller-supplied procedure timeouts.
pub const MAX_PROCEDURE_TIMEOUT_SECS: u64 = 300;

/// Statements echoed in results and audit logs are cut at this many characters.
pub const STATEMENT_ECHO_LIMIT: usize = 200;

/// One result row as an ordered column-name -> value mapping.
pub type Row = serde_json::Map<String, JsonValue>;

/// A positional parameter value bound into a statement.
///
/// Only scalars are representable; this is the full set of shapes a JSON
/// procedure-parameter value may take.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlParam {
    Null,
    Bool(bool),
    /// Covers every JSON integer the server can bind.
    Int(i64),
    Float(f64),
    String(String),
}

impl SqlParam {
    /// Convert a JSON scalar into a bindable parameter.
    ///
    /// Arrays and objects have no positional-binding representation and are
    /// rejected as validation failures.
    pub fn from_json(value: &JsonValue) -> DbResult<Self> {
        match value {
            JsonValue::Null => Ok(Self::Null),
            JsonValue::Bool(b) => Ok(Self::Bool(*b)),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Self::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(Self::Float(f))
                } else {
                    Err(DbError::validation(format!(
                        "Unsupported parameter value: {}",
                        n
                    )))
                }
            }
            JsonValue::String(s) => Ok(Self::String(s.clone())),
            JsonValue::Array(_) | JsonValue::Object(_) => Err(DbError::validation(
                "Unsupported parameter value: arrays and objects cannot be bound",
            )),
        }
    }
}

/// Truncate a statement for echoing in results and logs, UTF-8 safe.
pub fn truncate_statement(statement: &str, max_chars: usize) -> String {
    if statement.chars().count() <= max_chars {
        statement.to_string()
    } else {
        let cut: String = statement.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

/// One tabular result produced by a statement or procedure call.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResultSetBlock {
    /// Column names in result order.
    pub columns: Vec<String>,
    /// Rows as ordered column -> value mappings.
    pub rows: Vec<Row>,
    /// Number of rows in this block.
    pub row_count: usize,
}

/// Outcome of `run_query`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QueryOutcome {
    /// Whether the query ran to completion.
    pub success: bool,
    /// Result rows, capped at the requested maximum.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Row>>,
    /// Column names, present when the statement produced a row set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    /// Number of rows returned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
    /// Rows affected, reported for statements without a row set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,
    /// Wall-clock execution time in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
    /// Failure message when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set to "failed" when the statement was rejected before execution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<String>,
}

impl QueryOutcome {
    /// Successful outcome for a row-producing statement.
    pub fn with_rows(columns: Vec<String>, rows: Vec<Row>, execution_time_ms: u64) -> Self {
        let row_count = rows.len();
        Self {
            success: true,
            rows: Some(rows),
            columns: Some(columns),
            row_count: Some(row_count),
            rows_affected: None,
            execution_time_ms: Some(execution_time_ms),
            error: None,
            validation: None,
        }
    }

    /// Successful outcome for a statement without a row set.
    pub fn with_rows_affected(rows_affected: u64, execution_time_ms: u64) -> Self {
        Self {
            success: true,
            rows: Some(Vec::new()),
            columns: None,
            row_count: Some(0),
            rows_affected: Some(rows_affected),
            execution_time_ms: Some(execution_time_ms),
            error: None,
            validation: None,
        }
    }

    /// Failed outcome; validation rejections are tagged.
    pub fn failure(err: &DbError) -> Self {
        Self {
            success: false,
            rows: None,
            columns: None,
            row_count: None,
            rows_affected: None,
            execution_time_ms: None,
            error: Some(err.to_string()),
            validation: err.is_validation().then(|| "failed".to_string()),
        }
    }
}

/// Outcome of `run_procedure`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProcedureOutcome {
    /// Whether the procedure ran and every result set was drained.
    pub success: bool,
    /// Procedure name as validated, echoed back on executed calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub procedure: Option<String>,
    /// All result sets produced by the call, in order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_sets: Option<Vec<ResultSetBlock>>,
    /// Number of result sets collected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_set_count: Option<usize>,
    /// Wall-clock execution time in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
    /// Failure message when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set to "failed" when the call was rejected before execution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<String>,
}

impl ProcedureOutcome {
    /// Successful outcome with every collected result set.
    pub fn completed(
        procedure: impl Into<String>,
        result_sets: Vec<ResultSetBlock>,
        execution_time_ms: u64,
    ) -> Self {
        let result_set_count = result_sets.len();
        Self {
            success: true,
            procedure: Some(procedure.into()),
            result_sets: Some(result_sets),
            result_set_count: Some(result_set_count),
            execution_time_ms: Some(execution_time_ms),
            error: None,
            validation: None,
        }
    }

    /// Failure before the call was attempted (gate, identifier, catalog).
    pub fn failure(err: &DbError) -> Self {
        Self {
            success: false,
            procedure: None,
            result_sets: None,
            result_set_count: None,
            execution_time_ms: None,
            error: Some(err.to_string()),
            validation: err.is_validation().then(|| "failed".to_string()),
        }
    }

    /// Failure during the call itself; echoes the procedure name.
    pub fn failure_for(procedure: impl Into<String>, err: &DbError) -> Self {
        Self {
            procedure: Some(procedure.into()),
            ..Self::failure(err)
        }
    }
}

/// Outcome of `run_write`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WriteOutcome {
    /// Whether the statement executed and committed.
    pub success: bool,
    /// The statement, truncated for echoing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement: Option<String>,
    /// Rows affected by the committed statement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,
    /// Wall-clock execution time in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
    /// Failure message when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// "failed" on admission rejection, "passed" on dry runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<String>,
    /// Set on dry runs, which never touch the database.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
    /// Human-readable note accompanying dry-run results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// True when an execution failure left the transaction uncommitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback: Option<bool>,
}

impl WriteOutcome {
    /// Successful committed write.
    pub fn committed(statement: &str, rows_affected: u64, execution_time_ms: u64) -> Self {
        Self {
            success: true,
            statement: Some(truncate_statement(statement, STATEMENT_ECHO_LIMIT)),
            rows_affected: Some(rows_affected),
            execution_time_ms: Some(execution_time_ms),
            error: None,
            validation: None,
            dry_run: None,
            message: None,
            rollback: None,
        }
    }

    /// Dry-run result: validated, never executed.
    pub fn dry_run(statement: &str) -> Self {
        Self {
            success: true,
            statement: Some(statement.to_string()),
            rows_affected: None,
            execution_time_ms: None,
            error: None,
            validation: Some("passed".to_string()),
            dry_run: Some(true),
            message: Some("Statement is valid and would execute successfully".to_string()),
            rollback: None,
        }
    }

    /// Failure before execution (gate or admission).
    pub fn failure(err: &DbError) -> Self {
        Self {
            success: false,
            statement: None,
            rows_affected: None,
            execution_time_ms: None,
            error: Some(err.to_string()),
            validation: err.is_validation().then(|| "failed".to_string()),
            dry_run: None,
            message: None,
            rollback: None,
        }
    }

    /// Execution failure: the transaction was not committed.
    pub fn rolled_back(statement: &str, err: &DbError) -> Self {
        Self {
            success: false,
            statement: Some(truncate_statement(statement, STATEMENT_ECHO_LIMIT)),
            rows_affected: None,
            execution_time_ms: None,
            error: Some(err.to_string()),
            validation: None,
            dry_run: None,
            message: None,
            rollback: Some(true),
        }
    }
}
