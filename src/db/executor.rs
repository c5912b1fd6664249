//! Query execution engine.
//!
//! This module runs validated statements over pooled sessions:
//! - `run_query` for SELECT/CTE statements with a streaming row cap
//! - `run_procedure` for stored procedures with multiple result sets
//! - `run_write` for gated INSERT/UPDATE/DELETE statements
//!
//! Every operation returns a structured outcome instead of raising; callers
//! never see raw driver errors. Connections are released for reuse only after
//! clean use - any driver failure mid-operation discards the session so a
//! possibly-poisoned connection is never handed to another caller.

use crate::db::driver::{Cursor, Session};
use crate::db::pool::{ConnectionPool, PoolGuard, PoolStats};
use crate::db::validator;
use crate::error::{DbError, DbResult};
use crate::models::{
    MAX_PROCEDURE_TIMEOUT_SECS, ProcedureOutcome, QueryOutcome, ResultSetBlock, Row,
    STATEMENT_ECHO_LIMIT, SqlParam, WriteOutcome, truncate_statement,
};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const PROCEDURE_DISABLED: &str =
    "Stored procedure execution is disabled. Set MSSQL_ALLOW_WRITE_OPERATIONS=true to enable.";
const WRITES_DISABLED: &str =
    "Write operations are disabled. Set MSSQL_ALLOW_WRITE_OPERATIONS=true to enable.";
const NOT_DML: &str = "Only INSERT, UPDATE, DELETE statements are allowed";

/// Executes admitted statements over the connection pool.
pub struct QueryEngine {
    pool: Arc<ConnectionPool>,
    allow_write: bool,
}

impl QueryEngine {
    pub fn new(pool: Arc<ConnectionPool>, allow_write: bool) -> Self {
        Self { pool, allow_write }
    }

    /// The pool backing this engine.
    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Current pool occupancy.
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Whether write operations and stored procedures are enabled.
    pub fn allow_write(&self) -> bool {
        self.allow_write
    }

    /// Run a statement and collect up to `max_rows` rows.
    ///
    /// SELECT/CTE statements stream their first result set and stop pulling
    /// rows once the cap is reached; other statements (admitted only when
    /// writes are enabled) are executed, committed, and reported as an
    /// affected-row count.
    pub async fn run_query(
        &self,
        statement: &str,
        database: Option<&str>,
        max_rows: usize,
    ) -> QueryOutcome {
        if let Err(e) = validator::validate_query(statement, self.allow_write) {
            return QueryOutcome::failure(&e);
        }

        let start = Instant::now();
        debug!(
            statement = %truncate_statement(statement, STATEMENT_ECHO_LIMIT),
            max_rows,
            "Executing query"
        );

        let mut guard = match self.pool.acquire().await {
            Ok(guard) => guard,
            Err(e) => {
                error!(error = %e, "Query execution failed");
                return QueryOutcome::failure(&e);
            }
        };

        if let Some(db) = database {
            if let Err(e) = switch_database(guard.session(), db).await {
                resolve_switch_failure(guard, &e).await;
                return QueryOutcome::failure(&e);
            }
        }

        let result = if validator::is_select_statement(statement) {
            fetch_capped(guard.session(), statement, max_rows)
                .await
                .map(|(columns, rows)| QueryOutcome::with_rows(columns, rows, elapsed_ms(start)))
        } else {
            execute_and_commit(guard.session(), statement)
                .await
                .map(|rows_affected| {
                    QueryOutcome::with_rows_affected(rows_affected, elapsed_ms(start))
                })
        };

        match result {
            Ok(outcome) => {
                guard.release().await;
                outcome
            }
            Err(e) => {
                error!(error = %e, "Query execution failed");
                guard.discard().await;
                QueryOutcome::failure(&e)
            }
        }
    }

    /// Call a stored procedure and collect every result set it produces.
    ///
    /// Requires the write-enable flag. The whole conversation - database
    /// switch, call, result-set drain, commit - runs under one timeout,
    /// clamped to 300 seconds.
    pub async fn run_procedure(
        &self,
        name: &str,
        params: &Map<String, JsonValue>,
        database: Option<&str>,
        timeout_secs: u64,
    ) -> ProcedureOutcome {
        if !self.allow_write {
            warn!(procedure = %name, "Blocked stored procedure execution attempt");
            return ProcedureOutcome::failure(&DbError::disabled(PROCEDURE_DISABLED));
        }

        let timeout_secs = clamp_timeout(timeout_secs);

        if !validator::is_valid_identifier(name) {
            let err = DbError::validation(format!("Invalid procedure name format: {name}"));
            return ProcedureOutcome::failure(&err);
        }

        let named = match bind_named_params(params) {
            Ok(named) => named,
            Err(e) => return ProcedureOutcome::failure(&e),
        };

        let start = Instant::now();
        info!(
            procedure = %name,
            params = ?named.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
            "Executing stored procedure"
        );

        let mut guard = match self.pool.acquire().await {
            Ok(guard) => guard,
            Err(e) => {
                error!(error = %e, "Stored procedure execution failed");
                return ProcedureOutcome::failure_for(name, &e);
            }
        };

        let conversation = async {
            if let Some(db) = database {
                switch_database(guard.session(), db).await?;
            }
            run_procedure_call(guard.session(), name, &named).await
        };

        match tokio::time::timeout(Duration::from_secs(timeout_secs), conversation).await {
            Ok(Ok(result_sets)) => {
                guard.release().await;
                let execution_time_ms = elapsed_ms(start);
                info!(execution_time_ms, "Stored procedure executed successfully");
                ProcedureOutcome::completed(name, result_sets, execution_time_ms)
            }
            Ok(Err(e)) => {
                if matches!(e, DbError::DatabaseNotFound { .. }) {
                    debug!(error = %e, "Database switch rejected");
                    guard.release().await;
                    ProcedureOutcome::failure(&e)
                } else {
                    error!(error = %e, "Stored procedure execution failed");
                    guard.discard().await;
                    ProcedureOutcome::failure_for(name, &e)
                }
            }
            Err(_) => {
                let e = DbError::timeout("stored procedure execution", timeout_secs);
                error!(error = %e, "Stored procedure execution failed");
                guard.discard().await;
                ProcedureOutcome::failure_for(name, &e)
            }
        }
    }

    /// Execute one DML statement inside a committed transaction.
    ///
    /// Requires the write-enable flag and a statement whose leading keyword is
    /// INSERT, UPDATE, or DELETE. With `dry_run` the statement is validated
    /// and echoed back without touching the pool. A driver failure reports
    /// `rollback: true`: the session is discarded with its transaction
    /// uncommitted, so nothing persists.
    pub async fn run_write(
        &self,
        statement: &str,
        database: Option<&str>,
        dry_run: bool,
    ) -> WriteOutcome {
        if !self.allow_write {
            warn!(
                statement = %truncate_statement(statement, 100),
                "Blocked write operation attempt"
            );
            return WriteOutcome::failure(&DbError::disabled(WRITES_DISABLED));
        }

        if let Err(e) = validator::validate_query(statement, true) {
            return WriteOutcome::failure(&e);
        }

        let normalized = statement.trim().to_uppercase();
        if !(normalized.starts_with("INSERT")
            || normalized.starts_with("UPDATE")
            || normalized.starts_with("DELETE"))
        {
            return WriteOutcome::failure(&DbError::validation(NOT_DML));
        }

        if dry_run {
            info!(
                statement = %truncate_statement(statement, 100),
                "Dry-run validation successful"
            );
            return WriteOutcome::dry_run(statement);
        }

        let start = Instant::now();
        warn!(
            statement = %truncate_statement(statement, STATEMENT_ECHO_LIMIT),
            "Executing write operation"
        );

        let mut guard = match self.pool.acquire().await {
            Ok(guard) => guard,
            Err(e) => {
                error!(error = %e, "Write operation failed");
                return WriteOutcome::failure(&e);
            }
        };

        if let Some(db) = database {
            if let Err(e) = switch_database(guard.session(), db).await {
                resolve_switch_failure(guard, &e).await;
                return WriteOutcome::failure(&e);
            }
        }

        match execute_and_commit(guard.session(), statement).await {
            Ok(rows_affected) => {
                guard.release().await;
                let execution_time_ms = elapsed_ms(start);
                warn!(rows_affected, execution_time_ms, "Write operation completed");
                WriteOutcome::committed(statement, rows_affected, execution_time_ms)
            }
            Err(e) => {
                error!(error = %e, "Write operation failed");
                guard.discard().await;
                WriteOutcome::rolled_back(statement, &e)
            }
        }
    }

    /// Run a parameterized catalog query and collect all of its rows.
    ///
    /// This is the schema-introspection path. It does not pass through
    /// statement admission, so callers must not feed it user-written SQL.
    pub async fn fetch_catalog(
        &self,
        statement: &str,
        params: &[SqlParam],
    ) -> DbResult<Vec<Row>> {
        let mut guard = self.pool.acquire().await?;
        match fetch_rows(guard.session(), statement, params).await {
            Ok(rows) => {
                guard.release().await;
                Ok(rows)
            }
            Err(e) => {
                error!(error = %e, "Catalog query failed");
                guard.discard().await;
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("allow_write", &self.allow_write)
            .field("pool", &self.pool)
            .finish()
    }
}

/// Switch the session's database context after verifying the target exists
/// in the server catalog. The verified name is the only text interpolated.
async fn switch_database(session: &mut dyn Session, database: &str) -> DbResult<()> {
    let exists = {
        let mut cursor = session
            .query(
                "SELECT name FROM sys.databases WHERE name = @P1",
                &[SqlParam::String(database.to_string())],
            )
            .await?;
        cursor.next_row().await?.is_some()
    };

    if !exists {
        return Err(DbError::database_not_found(database));
    }

    let use_statement = format!("USE [{}]", database.replace(']', "]]"));
    session.execute(&use_statement, &[]).await?;
    Ok(())
}

/// A rejected database switch leaves the session healthy; anything else that
/// failed mid-switch does not.
async fn resolve_switch_failure(guard: PoolGuard, err: &DbError) {
    if matches!(err, DbError::DatabaseNotFound { .. }) {
        debug!(error = %err, "Database switch rejected");
        guard.release().await;
    } else {
        error!(error = %err, "Database switch failed");
        guard.discard().await;
    }
}

/// Stream the first result set, stopping at `max_rows`. Rows beyond the cap
/// are never pulled from the wire.
async fn fetch_capped(
    session: &mut dyn Session,
    statement: &str,
    max_rows: usize,
) -> DbResult<(Vec<String>, Vec<Row>)> {
    let mut cursor = session.query(statement, &[]).await?;
    let columns = cursor.columns().map(<[String]>::to_vec).unwrap_or_default();

    let mut rows = Vec::new();
    while rows.len() < max_rows {
        match cursor.next_row().await? {
            Some(values) => rows.push(zip_row(&columns, values)),
            None => break,
        }
    }

    if rows.len() == max_rows {
        debug!(max_rows, "Row cap reached, remaining rows not fetched");
    }

    Ok((columns, rows))
}

/// Drain every row of the first result set.
async fn fetch_rows(
    session: &mut dyn Session,
    statement: &str,
    params: &[SqlParam],
) -> DbResult<Vec<Row>> {
    let mut cursor = session.query(statement, params).await?;
    let columns = cursor.columns().map(<[String]>::to_vec).unwrap_or_default();
    let mut rows = Vec::new();
    while let Some(values) = cursor.next_row().await? {
        rows.push(zip_row(&columns, values));
    }
    Ok(rows)
}

async fn execute_and_commit(session: &mut dyn Session, statement: &str) -> DbResult<u64> {
    let rows_affected = session.execute(statement, &[]).await?;
    session.commit().await?;
    Ok(rows_affected)
}

/// Execute the procedure call and drain every result set, then commit.
async fn run_procedure_call(
    session: &mut dyn Session,
    name: &str,
    named: &[(String, SqlParam)],
) -> DbResult<Vec<ResultSetBlock>> {
    let exec_statement = build_exec_statement(name, named);
    let values: Vec<SqlParam> = named.iter().map(|(_, value)| value.clone()).collect();

    let result_sets = {
        let mut cursor = session.query(&exec_statement, &values).await?;
        collect_result_sets(&mut *cursor).await?
    };

    session.commit().await?;
    Ok(result_sets)
}

/// Collect each result set as an independent block, in production order.
/// Result-set-less activity inside the procedure yields no block.
async fn collect_result_sets(cursor: &mut dyn Cursor) -> DbResult<Vec<ResultSetBlock>> {
    let mut blocks = Vec::new();
    loop {
        if let Some(columns) = cursor.columns().map(<[String]>::to_vec) {
            let mut rows = Vec::new();
            while let Some(values) = cursor.next_row().await? {
                rows.push(zip_row(&columns, values));
            }
            blocks.push(ResultSetBlock {
                row_count: rows.len(),
                columns,
                rows,
            });
        }
        if !cursor.advance().await? {
            break;
        }
    }
    Ok(blocks)
}

/// `EXEC name @a = @P1, @b = @P2` with positional placeholders; values are
/// always bound, never interpolated.
fn build_exec_statement(name: &str, named: &[(String, SqlParam)]) -> String {
    if named.is_empty() {
        return format!("EXEC {name}");
    }
    let assignments: Vec<String> = named
        .iter()
        .enumerate()
        .map(|(i, (key, _))| format!("@{key} = @P{}", i + 1))
        .collect();
    format!("EXEC {name} {}", assignments.join(", "))
}

/// Check parameter names (they are interpolated into the call text) and
/// convert values to bindable scalars. Placeholder numbers are assigned in
/// the same pass that collects the values, so names and positions line up
/// regardless of map iteration order.
fn bind_named_params(params: &Map<String, JsonValue>) -> DbResult<Vec<(String, SqlParam)>> {
    params
        .iter()
        .map(|(key, value)| {
            if key.is_empty() || !key.chars().all(|c| c.is_alphanumeric() || c == '_') {
                return Err(DbError::validation(format!(
                    "Invalid parameter name: {key}"
                )));
            }
            Ok((key.clone(), SqlParam::from_json(value)?))
        })
        .collect()
}

/// Cap a requested procedure timeout at the allowed maximum.
fn clamp_timeout(requested: u64) -> u64 {
    if requested > MAX_PROCEDURE_TIMEOUT_SECS {
        warn!(requested, "Timeout capped at 300 seconds");
        MAX_PROCEDURE_TIMEOUT_SECS
    } else {
        requested
    }
}

fn zip_row(columns: &[String], values: Vec<JsonValue>) -> Row {
    columns.iter().cloned().zip(values).collect()
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
