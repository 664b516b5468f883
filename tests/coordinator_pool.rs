//! Coordinator Pool Tests
//!
//! - At most 65535 coordinators exist; one more concurrent acquire fails
//! - A released coordinator is the next one handed out
//! - Every acquire is released exactly once
//! - Draining the pool destroys every coordinator and sums their timing

use std::sync::Arc;
use std::time::{Duration, Instant};

use paxgate::command::{CommandCodec, CommandEnvelope, FramePolicy};
use paxgate::observability::MetricsRegistry;
use paxgate::pool::{CoordinatorConfig, CoordinatorPool, PoolError, MAX_COORDINATORS};
use paxgate::protocol::local::LocalProtocol;
use paxgate::protocol::ReplicationProtocol;

fn config() -> CoordinatorConfig {
    CoordinatorConfig {
        partition_id: 0,
        locale_id: 0,
        codec: CommandCodec::new(FramePolicy::Exact),
    }
}

fn pool_with_max(max: usize) -> (CoordinatorPool, Arc<MetricsRegistry>) {
    let metrics = Arc::new(MetricsRegistry::new());
    let protocol: Arc<dyn ReplicationProtocol> = Arc::new(LocalProtocol::new());
    let pool = CoordinatorPool::with_max(protocol, config(), Arc::clone(&metrics), max);
    (pool, metrics)
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(1));
    }
}

// =============================================================================
// Bound
// =============================================================================

/// The 65536th concurrent acquire is refused.
#[test]
fn test_default_bound_is_u16_max() {
    let metrics = Arc::new(MetricsRegistry::new());
    let pool = CoordinatorPool::new(Arc::new(LocalProtocol::new()), config(), metrics);
    assert_eq!(pool.max(), MAX_COORDINATORS);

    let handles: Vec<_> = (0..MAX_COORDINATORS)
        .map(|_| pool.acquire().unwrap())
        .collect();
    assert_eq!(handles.last().unwrap().id() as usize, MAX_COORDINATORS - 1);

    let err = pool.acquire().unwrap_err();
    assert_eq!(err, PoolError::Exhausted { max: MAX_COORDINATORS });

    drop(handles);
    let stats = pool.stats();
    assert_eq!(stats.created, MAX_COORDINATORS);
    assert_eq!(stats.free, MAX_COORDINATORS);
    assert!(pool.acquire().is_ok());
}

#[test]
fn test_bound_is_clamped() {
    let (pool, _) = pool_with_max(usize::MAX);
    assert_eq!(pool.max(), MAX_COORDINATORS);
}

#[test]
fn test_small_bound_recovers_after_release() {
    let (pool, _) = pool_with_max(2);
    let a = pool.acquire().unwrap();
    let _b = pool.acquire().unwrap();
    assert!(matches!(pool.acquire(), Err(PoolError::Exhausted { max: 2 })));

    a.release();
    assert!(pool.acquire().is_ok());
}

// =============================================================================
// Reuse
// =============================================================================

/// Release then acquire returns the same coordinator.
#[test]
fn test_release_then_acquire_reuses_id() {
    let (pool, metrics) = pool_with_max(8);
    let first = pool.acquire().unwrap();
    let id = first.id();
    first.release();

    let again = pool.acquire().unwrap();
    assert_eq!(again.id(), id);
    assert_eq!(metrics.snapshot().coordinators_created, 1);
}

/// The most recently freed coordinator is handed out first.
#[test]
fn test_most_recently_freed_first() {
    let (pool, _) = pool_with_max(8);
    let a = pool.acquire().unwrap();
    let _b = pool.acquire().unwrap();
    let c = pool.acquire().unwrap();
    let c_id = c.id();

    a.release();
    c.release();
    assert_eq!(pool.acquire().unwrap().id(), c_id);
}

/// Ids are assigned from zero in creation order.
#[test]
fn test_ids_are_sequential() {
    let (pool, _) = pool_with_max(8);
    let held: Vec<_> = (0..4).map(|_| pool.acquire().unwrap()).collect();
    let ids: Vec<u32> = held.iter().map(|h| h.id()).collect();
    assert_eq!(ids, vec![0, 1, 2, 3]);
}

// =============================================================================
// Completion
// =============================================================================

/// A submitted coordinator returns to the pool once its command is learned.
#[test]
fn test_submission_returns_coordinator() {
    let (pool, _) = pool_with_max(4);
    pool.acquire()
        .unwrap()
        .submit(CommandEnvelope::from_slice(b"abc\0"))
        .unwrap();

    wait_until(|| pool.stats().checked_out == 0);
    assert_eq!(pool.stats().free, 1);
}

// =============================================================================
// Drain
// =============================================================================

#[test]
fn test_drain_all_sums_timing() {
    let (pool, _) = pool_with_max(4);
    for payload in [&b"one"[..], &b"two"[..], &b"three"[..]] {
        pool.acquire()
            .unwrap()
            .submit(CommandEnvelope::from_slice(payload))
            .unwrap();
        wait_until(|| pool.stats().checked_out == 0);
    }

    let totals = pool.drain_all();
    assert_eq!(totals.coordinators, 1);
    assert_eq!(totals.stats.instances, 3);
    assert!(totals.to_string().starts_with("coordinators=1 instances=3"));
}

/// After draining, the pool refuses work and ignores late completions.
#[test]
fn test_drained_pool_is_closed() {
    let (pool, _) = pool_with_max(4);
    let late = pool.acquire().unwrap();

    let totals = pool.drain_all();
    assert_eq!(totals.coordinators, 1);
    assert_eq!(pool.acquire().unwrap_err(), PoolError::Closed);

    late.release();
    assert_eq!(pool.stats().created, 0);
}
