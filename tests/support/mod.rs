//! Scripted driver stubs shared by the integration tests.
//!
//! The stubs implement the driver traits over in-memory scripts so pool
//! accounting and engine behavior can be exercised without a SQL Server.
//! Every interesting interaction is observable: SQL text and parameters are
//! logged, and counters track sessions opened, rows pulled, commits, and
//! closes.

#![allow(dead_code)]

use async_trait::async_trait;
use mssql_mcp_server::config::Config;
use mssql_mcp_server::db::{ConnectionPool, Connector, Cursor, QueryEngine, Session};
use mssql_mcp_server::error::{DbError, DbResult};
use mssql_mcp_server::models::{PoolSettings, SqlParam};
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One scripted result set: column names plus rows of JSON scalars.
#[derive(Clone, Debug)]
pub struct StubResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<JsonValue>>,
}

impl StubResultSet {
    pub fn new(columns: &[&str], rows: Vec<Vec<JsonValue>>) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        }
    }
}

/// Scripted response for one `Session::query` call.
pub enum QueryStep {
    Sets(Vec<StubResultSet>),
    Fail(&'static str),
}

/// Shared observable state behind every stub session.
#[derive(Default)]
pub struct StubState {
    /// Sessions successfully opened
    pub connects: AtomicUsize,
    /// Error messages consumed by the next connect attempts, FIFO
    pub connect_failures: Mutex<VecDeque<&'static str>>,
    /// Every SQL string passed to query/execute, in call order
    pub sql_log: Mutex<Vec<String>>,
    /// Parameter lists matching sql_log entries
    pub params_log: Mutex<Vec<Vec<SqlParam>>>,
    /// Scripted responses for query calls, FIFO; empty falls back to default_sets
    pub query_steps: Mutex<VecDeque<QueryStep>>,
    /// Fallback result sets when query_steps is exhausted
    pub default_sets: Mutex<Vec<StubResultSet>>,
    /// Scripted responses for execute calls, FIFO; empty means Ok(0)
    pub execute_results: Mutex<VecDeque<Result<u64, &'static str>>>,
    /// Rows handed out by next_row
    pub rows_pulled: AtomicUsize,
    pub pings: AtomicUsize,
    pub commits: AtomicUsize,
    pub closes: AtomicUsize,
    /// Ping succeeds while true
    pub ping_healthy: AtomicBool,
    /// Artificial latency before every query responds
    pub query_delay: Mutex<Option<Duration>>,
}

impl StubState {
    pub fn new() -> Arc<Self> {
        let state = Self::default();
        state.ping_healthy.store(true, Ordering::SeqCst);
        Arc::new(state)
    }

    pub fn push_query_sets(&self, sets: Vec<StubResultSet>) {
        self.query_steps.lock().push_back(QueryStep::Sets(sets));
    }

    pub fn push_query_failure(&self, message: &'static str) {
        self.query_steps.lock().push_back(QueryStep::Fail(message));
    }

    pub fn push_execute_result(&self, result: Result<u64, &'static str>) {
        self.execute_results.lock().push_back(result);
    }

    /// Script the catalog existence check that precedes a database switch.
    pub fn script_database_exists(&self, exists: bool) {
        let rows = if exists {
            vec![vec![JsonValue::String("any".to_string())]]
        } else {
            Vec::new()
        };
        self.push_query_sets(vec![StubResultSet::new(&["name"], rows)]);
    }

    pub fn logged_sql(&self) -> Vec<String> {
        self.sql_log.lock().clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rows_pulled(&self) -> usize {
        self.rows_pulled.load(Ordering::SeqCst)
    }
}

pub struct StubConnector {
    state: Arc<StubState>,
}

impl StubConnector {
    pub fn new(state: Arc<StubState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Connector for StubConnector {
    async fn connect(&self) -> DbResult<Box<dyn Session>> {
        if let Some(message) = self.state.connect_failures.lock().pop_front() {
            return Err(DbError::connection(message, "scripted failure"));
        }
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubSession {
            state: self.state.clone(),
        }))
    }

    fn endpoint(&self) -> String {
        "stub:1433/master".to_string()
    }
}

pub struct StubSession {
    state: Arc<StubState>,
}

#[async_trait]
impl Session for StubSession {
    async fn query<'a>(
        &'a mut self,
        sql: &str,
        params: &[SqlParam],
    ) -> DbResult<Box<dyn Cursor + 'a>> {
        self.state.sql_log.lock().push(sql.to_string());
        self.state.params_log.lock().push(params.to_vec());

        let delay = *self.state.query_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let step = self.state.query_steps.lock().pop_front();
        let sets = match step {
            Some(QueryStep::Sets(sets)) => sets,
            Some(QueryStep::Fail(message)) => {
                return Err(DbError::database(message, None, "scripted failure"));
            }
            None => self.state.default_sets.lock().clone(),
        };

        Ok(Box::new(StubCursor::new(self.state.clone(), sets)))
    }

    async fn execute(&mut self, sql: &str, params: &[SqlParam]) -> DbResult<u64> {
        self.state.sql_log.lock().push(sql.to_string());
        self.state.params_log.lock().push(params.to_vec());

        match self.state.execute_results.lock().pop_front() {
            Some(Ok(rows_affected)) => Ok(rows_affected),
            Some(Err(message)) => Err(DbError::database(message, None, "scripted failure")),
            None => Ok(0),
        }
    }

    async fn ping(&mut self) -> DbResult<()> {
        self.state.pings.fetch_add(1, Ordering::SeqCst);
        if self.state.ping_healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DbError::connection("ping failed", "scripted failure"))
        }
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.state.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&mut self) -> DbResult<()> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct CurrentSet {
    columns: Vec<String>,
    rows: VecDeque<Vec<JsonValue>>,
}

pub struct StubCursor {
    state: Arc<StubState>,
    remaining: VecDeque<StubResultSet>,
    current: Option<CurrentSet>,
}

impl StubCursor {
    fn new(state: Arc<StubState>, sets: Vec<StubResultSet>) -> Self {
        let mut remaining: VecDeque<StubResultSet> = sets.into();
        let current = remaining.pop_front().map(|set| CurrentSet {
            columns: set.columns,
            rows: set.rows.into(),
        });
        Self {
            state,
            remaining,
            current,
        }
    }
}

#[async_trait]
impl Cursor for StubCursor {
    fn columns(&self) -> Option<&[String]> {
        self.current.as_ref().map(|set| set.columns.as_slice())
    }

    async fn next_row(&mut self) -> DbResult<Option<Vec<JsonValue>>> {
        let Some(current) = self.current.as_mut() else {
            return Ok(None);
        };
        match current.rows.pop_front() {
            Some(row) => {
                self.state.rows_pulled.fetch_add(1, Ordering::SeqCst);
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }

    async fn advance(&mut self) -> DbResult<bool> {
        match self.remaining.pop_front() {
            Some(set) => {
                self.current = Some(CurrentSet {
                    columns: set.columns,
                    rows: set.rows.into(),
                });
                Ok(true)
            }
            None => {
                self.current = None;
                Ok(false)
            }
        }
    }
}

/// Pool settings with generous lifetimes so health checks stay out of the way.
pub fn relaxed_settings(min_size: usize, max_size: usize) -> PoolSettings {
    PoolSettings {
        min_size,
        max_size,
        idle_timeout: Duration::from_secs(300),
        max_lifetime: Duration::from_secs(1800),
    }
}

pub fn stub_pool(settings: PoolSettings) -> (Arc<ConnectionPool>, Arc<StubState>) {
    let state = StubState::new();
    let pool = Arc::new(ConnectionPool::new(
        Box::new(StubConnector::new(state.clone())),
        settings,
    ));
    (pool, state)
}

/// Engine over a warmed single-connection stub pool.
///
/// One connection sits idle up front so acquisition pops immediately instead
/// of sitting out the bounded idle wait. Tests that discard it can read the
/// damage from the pool stats without re-acquiring.
pub async fn stub_engine(allow_write: bool) -> (Arc<QueryEngine>, Arc<StubState>) {
    let (pool, state) = stub_pool(relaxed_settings(1, 4));
    pool.warm_up().await;
    (Arc::new(QueryEngine::new(pool, allow_write)), state)
}

/// A config whose projections are safe to build pools from in tests.
pub fn stub_config() -> Config {
    Config {
        password: "test".to_string(),
        ..Config::default()
    }
}
