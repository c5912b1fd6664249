//! Driver abstraction for SQL Server sessions.
//!
//! The pool and the query engine only ever talk to these traits. The production
//! implementation lives in [`crate::db::mssql`]; tests substitute scripted stubs
//! so pool accounting and engine behavior can be exercised without a server.

use crate::error::DbResult;
use crate::models::SqlParam;
use async_trait::async_trait;
use serde_json::Value as JsonValue;

/// Opens new server sessions. One connector is shared by the whole pool.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish a fresh session, fully authenticated and ready for queries.
    async fn connect(&self) -> DbResult<Box<dyn Session>>;

    /// Human-readable endpoint for log lines, e.g. `db.internal:1433/master`.
    fn endpoint(&self) -> String;
}

/// A single live database session.
///
/// Sessions are not thread-safe; the pool hands each one to exactly one task
/// at a time. All statement text must already be validated by the caller.
#[async_trait]
pub trait Session: Send {
    /// Run a statement that produces result sets and return a cursor over them.
    ///
    /// The cursor borrows the session, so the session cannot be used for
    /// anything else until the cursor is dropped.
    async fn query<'a>(
        &'a mut self,
        sql: &str,
        params: &[SqlParam],
    ) -> DbResult<Box<dyn Cursor + 'a>>;

    /// Run a statement without result sets and return the affected row count.
    async fn execute(&mut self, sql: &str, params: &[SqlParam]) -> DbResult<u64>;

    /// Cheap liveness probe (`SELECT 1`).
    async fn ping(&mut self) -> DbResult<()>;

    /// Commit the session's open transaction, if any.
    async fn commit(&mut self) -> DbResult<()>;

    /// Close the session. Any uncommitted work is rolled back server-side.
    async fn close(&mut self) -> DbResult<()>;
}

/// Streaming view over the result sets of one executed statement.
///
/// A cursor starts positioned on the first result set. Rows are pulled one at
/// a time; rows never fetched are never materialized.
#[async_trait]
pub trait Cursor: Send {
    /// Column names of the current result set, in select order.
    fn columns(&self) -> Option<&[String]>;

    /// Next row of the current result set, or `None` once it is exhausted.
    async fn next_row(&mut self) -> DbResult<Option<Vec<JsonValue>>>;

    /// Move to the next result set, discarding any unread rows in the current
    /// one. Returns `false` when no further result sets exist.
    async fn advance(&mut self) -> DbResult<bool>;
}
