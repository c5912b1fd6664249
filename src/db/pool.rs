//! Bounded connection pool for SQL Server sessions.
//!
//! The pool keeps idle sessions in a queue and tracks the total number of
//! live sessions (idle plus on loan) against a hard maximum. Acquisition
//! prefers reuse, falls back to creation while capacity remains, and only
//! then blocks for a session to come back.
//!
//! `idle_timeout` is carried in [`PoolSettings`] but not enforced by a
//! background task; stale sessions are caught by the liveness check and the
//! lifetime cap when they are next handed out.

use crate::db::driver::{Connector, Session};
use crate::error::DbResult;
use crate::models::PoolSettings;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

/// How long `acquire` waits for an idle session before trying to create one.
const IDLE_WAIT: Duration = Duration::from_secs(5);

/// Pool occupancy snapshot.
#[derive(Debug, Clone, Copy, serde::Serialize, schemars::JsonSchema)]
pub struct PoolStats {
    /// Live connections, idle plus on loan.
    pub total_connections: usize,
    /// Idle connections ready for reuse.
    pub available_connections: usize,
    /// Hard ceiling on live connections.
    pub max_connections: usize,
    /// Connections created at startup.
    pub min_connections: usize,
}

/// A live session together with its pool bookkeeping.
pub struct PooledConnection {
    session: Box<dyn Session>,
    created_at: Instant,
    /// When this session was last handed out. Tracked for eviction
    /// diagnostics; idle age itself is not an eviction trigger.
    last_used_at: Instant,
}

impl PooledConnection {
    fn new(session: Box<dyn Session>) -> Self {
        let now = Instant::now();
        Self {
            session,
            created_at: now,
            last_used_at: now,
        }
    }

    fn session_mut(&mut self) -> &mut dyn Session {
        &mut *self.session
    }

    fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    fn idle_time(&self) -> Duration {
        self.last_used_at.elapsed()
    }

    fn touch(&mut self) {
        self.last_used_at = Instant::now();
    }
}

/// Idle sessions plus a wakeup channel for tasks waiting on one.
///
/// The `notified()` future is always created before the queue is checked, so
/// a release landing between the check and the await cannot be missed.
struct IdleQueue {
    entries: Mutex<VecDeque<PooledConnection>>,
    notify: Notify,
}

impl IdleQueue {
    fn new() -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }

    fn pop_now(&self) -> Option<PooledConnection> {
        self.entries.lock().pop_front()
    }

    /// Push unless the queue already holds `capacity` entries; on overflow the
    /// connection is handed back for disposal.
    fn push(&self, conn: PooledConnection, capacity: usize) -> Result<(), PooledConnection> {
        {
            let mut entries = self.entries.lock();
            if entries.len() >= capacity {
                return Err(conn);
            }
            entries.push_back(conn);
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Pop with a deadline; `None` when nothing arrived in time.
    async fn pop_timeout(&self, wait: Duration) -> Option<PooledConnection> {
        let deadline = Instant::now() + wait;
        loop {
            let notified = self.notify.notified();
            if let Some(conn) = self.pop_now() {
                return Some(conn);
            }
            let remaining = deadline.checked_duration_since(Instant::now())?;
            if tokio::time::timeout(remaining, notified).await.is_err() {
                return self.pop_now();
            }
        }
    }

    /// Pop, waiting however long it takes.
    async fn pop_unbounded(&self) -> PooledConnection {
        loop {
            let notified = self.notify.notified();
            if let Some(conn) = self.pop_now() {
                return conn;
            }
            notified.await;
        }
    }
}

/// Bounded pool of SQL Server sessions.
pub struct ConnectionPool {
    connector: Box<dyn Connector>,
    settings: PoolSettings,
    idle: IdleQueue,
    /// Live connections, idle plus on loan. Never exceeds `settings.max_size`.
    count: AtomicUsize,
}

impl ConnectionPool {
    pub fn new(connector: Box<dyn Connector>, settings: PoolSettings) -> Self {
        Self {
            connector,
            settings,
            idle: IdleQueue::new(),
            count: AtomicUsize::new(0),
        }
    }

    /// Pre-create the configured minimum number of connections.
    ///
    /// Failures are logged and skipped; the server still starts and later
    /// acquisitions retry creation on demand.
    pub async fn warm_up(&self) {
        for _ in 0..self.settings.min_size {
            if !self.try_reserve_slot() {
                break;
            }
            match self.connector.connect().await {
                Ok(session) => {
                    if let Err(conn) = self
                        .idle
                        .push(PooledConnection::new(session), self.settings.max_size)
                    {
                        self.dispose(conn).await;
                    }
                }
                Err(e) => {
                    self.count.fetch_sub(1, Ordering::SeqCst);
                    error!(error = %e, "Failed to initialize connection");
                }
            }
        }
        info!(
            min = self.settings.min_size,
            max = self.settings.max_size,
            "Connection pool initialized"
        );
    }

    /// Borrow a session, preferring idle reuse over creation.
    ///
    /// The returned guard must be resolved with [`PoolGuard::release`] or
    /// [`PoolGuard::discard`]; an unresolved drop closes the session.
    pub async fn acquire(self: &Arc<Self>) -> DbResult<PoolGuard> {
        let mut conn = self.acquire_connection().await?;
        conn.touch();
        Ok(PoolGuard {
            conn: Some(conn),
            pool: Arc::clone(self),
        })
    }

    async fn acquire_connection(&self) -> DbResult<PooledConnection> {
        // Reuse an idle session if one shows up within the bounded wait.
        if let Some(conn) = self.idle.pop_timeout(IDLE_WAIT).await {
            if let Some(conn) = self.validate(conn).await {
                return Ok(conn);
            }
            // Invalid session was disposed; capacity is free again, so fall
            // through to creation.
        }

        if self.try_reserve_slot() {
            match self.connector.connect().await {
                Ok(session) => {
                    let total = self.count.load(Ordering::SeqCst);
                    debug!(total, "Created new connection");
                    return Ok(PooledConnection::new(session));
                }
                Err(e) => {
                    self.count.fetch_sub(1, Ordering::SeqCst);
                    return Err(e);
                }
            }
        }

        warn!(
            endpoint = %self.connector.endpoint(),
            "Connection pool exhausted, waiting for available connection"
        );
        Ok(self.idle.pop_unbounded().await)
    }

    /// Atomically claim one unit of capacity.
    fn try_reserve_slot(&self) -> bool {
        self.count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                (count < self.settings.max_size).then_some(count + 1)
            })
            .is_ok()
    }

    /// Lifetime and liveness check for a session about to be handed out.
    /// Invalid sessions are disposed and `None` is returned.
    async fn validate(&self, mut conn: PooledConnection) -> Option<PooledConnection> {
        if conn.age() > self.settings.max_lifetime {
            debug!(
                age_secs = conn.age().as_secs(),
                idle_secs = conn.idle_time().as_secs(),
                "Retiring connection past max lifetime"
            );
            self.dispose(conn).await;
            return None;
        }

        match conn.session_mut().ping().await {
            Ok(()) => Some(conn),
            Err(e) => {
                debug!(
                    error = %e,
                    idle_secs = conn.idle_time().as_secs(),
                    "Idle connection failed liveness check"
                );
                self.dispose(conn).await;
                None
            }
        }
    }

    /// Return a healthy session to the idle queue.
    async fn release(&self, conn: PooledConnection) {
        if let Err(conn) = self.idle.push(conn, self.settings.max_size) {
            warn!("Idle queue full, closing returned connection");
            self.dispose(conn).await;
        }
    }

    /// Close a session and give up its capacity slot.
    async fn dispose(&self, mut conn: PooledConnection) {
        if let Err(e) = conn.session_mut().close().await {
            debug!(error = %e, "Error closing connection");
        }
        let total = self.count.fetch_sub(1, Ordering::SeqCst) - 1;
        debug!(total, "Connection closed");
    }

    /// Close every idle session. Sessions currently on loan are untouched and
    /// are closed by their guards when resolved.
    pub async fn close_all(&self) {
        let mut closed = 0usize;
        while let Some(conn) = self.idle.pop_now() {
            self.dispose(conn).await;
            closed += 1;
        }
        info!(closed, "All connections closed");
    }

    /// Current occupancy counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            total_connections: self.count.load(Ordering::SeqCst),
            available_connections: self.idle.len(),
            max_connections: self.settings.max_size,
            min_connections: self.settings.min_size,
        }
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("endpoint", &self.connector.endpoint())
            .field("total", &self.count.load(Ordering::SeqCst))
            .field("available", &self.idle.len())
            .field("max", &self.settings.max_size)
            .finish()
    }
}

/// RAII loan of one pooled session.
///
/// Resolve the loan explicitly: [`release`](Self::release) after clean use,
/// [`discard`](Self::discard) after any driver error. A guard dropped without
/// resolution closes its session from a spawned task rather than reusing it,
/// since its transaction state is unknown.
///
/// # Runtime shutdown behavior
///
/// The `Drop` implementation spawns a tokio task for the async close. If the
/// runtime is already shutting down that task may never run; this is
/// acceptable because the process is exiting and the server-side session
/// is torn down with the TCP stream. Critical paths always resolve guards
/// explicitly.
pub struct PoolGuard {
    conn: Option<PooledConnection>,
    pool: Arc<ConnectionPool>,
}

impl PoolGuard {
    /// The borrowed session.
    pub fn session(&mut self) -> &mut dyn Session {
        self.conn
            .as_mut()
            .expect("loan is held until the guard is resolved")
            .session_mut()
    }

    /// Return the session to the pool for reuse.
    pub async fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn).await;
        }
    }

    /// Close the session and free its capacity slot.
    pub async fn discard(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.dispose(conn).await;
        }
    }
}

impl Drop for PoolGuard {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };

        let pool = Arc::clone(&self.pool);
        tokio::spawn(async move {
            pool.dispose(conn).await;
            warn!("Connection discarded via Drop - resolve guards explicitly");
        });
    }
}

impl std::fmt::Debug for PoolGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolGuard")
            .field("resolved", &self.conn.is_none())
            .finish_non_exhaustive()
    }
}
