//! Integration tests for connection pool accounting.
//!
//! These tests drive the pool through scripted driver stubs and verify the
//! capacity invariant (idle + on loan never exceeds max), lazy eviction of
//! stale or dead sessions, and cleanup on discard, drop, and shutdown.

mod support;

use mssql_mcp_server::models::PoolSettings;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use support::{relaxed_settings, stub_pool};

/// Test that warm-up creates exactly the configured minimum and parks it idle.
#[tokio::test]
async fn test_warm_up_fills_to_min() {
    let (pool, state) = stub_pool(relaxed_settings(2, 5));
    pool.warm_up().await;

    let stats = pool.stats();
    assert_eq!(stats.total_connections, 2);
    assert_eq!(stats.available_connections, 2);
    assert_eq!(stats.min_connections, 2);
    assert_eq!(stats.max_connections, 5);
    assert_eq!(state.connects(), 2, "warm-up should open min_size sessions");
}

/// Test that warm-up never pushes the pool past its maximum.
#[tokio::test]
async fn test_warm_up_respects_max() {
    let (pool, state) = stub_pool(relaxed_settings(3, 2));
    pool.warm_up().await;

    assert_eq!(pool.stats().total_connections, 2);
    assert_eq!(state.connects(), 2);
}

/// Test that a failed initial connection is skipped, not fatal.
#[tokio::test]
async fn test_warm_up_survives_connect_failure() {
    let (pool, state) = stub_pool(relaxed_settings(2, 5));
    state.connect_failures.lock().push_back("login failed");
    pool.warm_up().await;

    let stats = pool.stats();
    assert_eq!(stats.total_connections, 1, "only the second attempt succeeds");
    assert_eq!(stats.available_connections, 1);
    assert_eq!(state.connects(), 1);
}

/// Test that concurrent acquirers never hold more sessions than max_size.
#[tokio::test]
async fn test_capacity_bound_under_contention() {
    let (pool, state) = stub_pool(relaxed_settings(4, 4));
    pool.warm_up().await;

    let in_use = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let pool = pool.clone();
        let in_use = in_use.clone();
        let peak = peak.clone();
        handles.push(tokio::spawn(async move {
            let guard = pool.acquire().await.unwrap();
            let now = in_use.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(2)).await;
            in_use.fetch_sub(1, Ordering::SeqCst);
            guard.release().await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert!(
        peak.load(Ordering::SeqCst) <= 4,
        "peak loans {} exceeded max_size",
        peak.load(Ordering::SeqCst)
    );
    assert_eq!(state.connects(), 4, "no session created beyond max_size");

    let stats = pool.stats();
    assert_eq!(stats.total_connections, 4);
    assert_eq!(stats.available_connections, 4);
}

/// Test that an acquirer at capacity waits for a release instead of failing.
#[tokio::test]
async fn test_exhausted_acquirer_waits_for_release() {
    let (pool, state) = stub_pool(relaxed_settings(1, 1));
    pool.warm_up().await;

    let holder = pool.acquire().await.unwrap();

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move {
            let guard = pool.acquire().await.unwrap();
            guard.release().await;
        })
    };

    // Give the waiter time to block before handing the session back.
    tokio::time::sleep(Duration::from_millis(25)).await;
    holder.release().await;
    waiter.await.unwrap();

    assert_eq!(state.connects(), 1, "the single session should be shared");
    assert_eq!(pool.stats().total_connections, 1);
    assert_eq!(pool.stats().available_connections, 1);
}

/// Test that an idle session failing its liveness probe is replaced.
#[tokio::test]
async fn test_dead_idle_session_replaced() {
    let (pool, state) = stub_pool(relaxed_settings(1, 4));
    pool.warm_up().await;
    state.ping_healthy.store(false, Ordering::SeqCst);

    let guard = pool.acquire().await.unwrap();
    assert_eq!(state.closes(), 1, "dead session should be closed");
    assert_eq!(state.connects(), 2, "a replacement should be created");

    guard.release().await;
    let stats = pool.stats();
    assert_eq!(stats.total_connections, 1);
    assert_eq!(stats.available_connections, 1);
}

/// Test that a session past max_lifetime is retired without a liveness probe.
#[tokio::test]
async fn test_expired_session_retired_on_acquire() {
    let settings = PoolSettings {
        min_size: 1,
        max_size: 4,
        idle_timeout: Duration::from_secs(300),
        max_lifetime: Duration::ZERO,
    };
    let (pool, state) = stub_pool(settings);
    pool.warm_up().await;

    let guard = pool.acquire().await.unwrap();
    assert_eq!(state.closes(), 1, "expired session should be closed");
    assert_eq!(state.connects(), 2);
    assert_eq!(
        state.pings.load(Ordering::SeqCst),
        0,
        "lifetime check should run before the liveness probe"
    );

    guard.discard().await;
    assert_eq!(pool.stats().total_connections, 0);
}

/// Test that close_all closes every idle session and zeroes the count.
#[tokio::test]
async fn test_close_all_closes_idle_sessions() {
    let (pool, state) = stub_pool(relaxed_settings(3, 5));
    pool.warm_up().await;

    pool.close_all().await;
    assert_eq!(state.closes(), 3);
    let stats = pool.stats();
    assert_eq!(stats.total_connections, 0);
    assert_eq!(stats.available_connections, 0);
}

/// Test that a guard dropped without release or discard still closes its
/// session from the spawned cleanup task.
#[tokio::test]
async fn test_dropped_guard_closes_session() {
    let (pool, state) = stub_pool(relaxed_settings(1, 2));
    pool.warm_up().await;

    let guard = pool.acquire().await.unwrap();
    drop(guard);

    // The close runs on a spawned task; yield until it lands.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(state.closes(), 1);
    assert_eq!(pool.stats().total_connections, 0);
}
