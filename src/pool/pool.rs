//! Bounded, recycling coordinator pool
//!
//! One mutex guards the pool state. Every critical section is a list
//! pop/push or a set insert/remove; no lock is held while a coordinator
//! runs. The pool lock is never taken while the tracker lock is held.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::invariant;
use crate::observability::{Event, Logger, MetricsRegistry, Severity};
use crate::protocol::{Coordinator, CoordinatorId, ReplicationProtocol};

use super::coordinator::{Completion, CoordinatorConfig, CoordinatorHandle, CoordinatorTotals};
use super::errors::{PoolError, PoolResult};

/// Upper bound on coordinators created over the life of a pool.
pub const MAX_COORDINATORS: usize = u16::MAX as usize;

/// Point-in-time pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Coordinators created so far
    pub created: usize,
    /// Coordinators waiting on the free list
    pub free: usize,
    /// Coordinators checked out to a submission
    pub checked_out: usize,
}

#[derive(Default)]
struct PoolState {
    /// Every coordinator ever created, indexed by id
    created: Vec<Arc<dyn Coordinator>>,
    /// Free list, most recently freed last
    free: Vec<CoordinatorId>,
    checked_out: HashSet<CoordinatorId>,
    closed: bool,
}

pub(super) struct PoolShared {
    protocol: Arc<dyn ReplicationProtocol>,
    config: CoordinatorConfig,
    max: usize,
    metrics: Arc<MetricsRegistry>,
    state: Mutex<PoolState>,
}

impl PoolShared {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(super) fn release(&self, id: CoordinatorId) {
        let mut state = self.lock();
        if state.closed {
            drop(state);
            let id = id.to_string();
            Logger::trace(Event::ReleaseAfterClose, &[("coordinator_id", &id)]);
            return;
        }
        if !state.checked_out.remove(&id) {
            drop(state);
            invariant::violation(
                "single_release",
                format!("coordinator {} released while not checked out", id),
            );
        }
        state.free.push(id);
        drop(state);

        if Logger::enabled(Severity::Trace) {
            let id = id.to_string();
            Logger::trace(Event::CoordinatorReleased, &[("coordinator_id", &id)]);
        }
    }
}

/// Creates, bounds and recycles coordinators.
#[derive(Clone)]
pub struct CoordinatorPool {
    shared: Arc<PoolShared>,
}

impl CoordinatorPool {
    /// Create a pool bounded by [`MAX_COORDINATORS`].
    pub fn new(
        protocol: Arc<dyn ReplicationProtocol>,
        config: CoordinatorConfig,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self::with_max(protocol, config, metrics, MAX_COORDINATORS)
    }

    /// Create a pool with a lower bound. `max` is clamped to
    /// [`MAX_COORDINATORS`].
    pub fn with_max(
        protocol: Arc<dyn ReplicationProtocol>,
        config: CoordinatorConfig,
        metrics: Arc<MetricsRegistry>,
        max: usize,
    ) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                protocol,
                config,
                max: max.min(MAX_COORDINATORS),
                metrics,
                state: Mutex::new(PoolState::default()),
            }),
        }
    }

    /// Maximum number of coordinators this pool creates.
    pub fn max(&self) -> usize {
        self.shared.max
    }

    /// Check out a coordinator.
    ///
    /// Reuses the most recently freed coordinator, otherwise creates one with
    /// the next id. Fails with [`PoolError::Exhausted`] once `max`
    /// coordinators exist and all are checked out.
    pub fn acquire(&self) -> PoolResult<CoordinatorHandle> {
        let shared = &self.shared;
        let mut state = shared.lock();
        if state.closed {
            return Err(PoolError::Closed);
        }

        let (id, coordinator, created) = match state.free.pop() {
            Some(id) => (id, Arc::clone(&state.created[id as usize]), false),
            None => {
                if state.created.len() >= shared.max {
                    return Err(PoolError::Exhausted { max: shared.max });
                }
                let id = state.created.len() as CoordinatorId;
                let coordinator = shared.protocol.create_coordinator(id, &shared.config);
                state.created.push(Arc::clone(&coordinator));
                (id, coordinator, true)
            }
        };
        state.checked_out.insert(id);
        drop(state);

        if created {
            shared.metrics.increment_coordinators_created();
            if Logger::enabled(Severity::Trace) {
                let id = id.to_string();
                let partition = shared.config.partition_id.to_string();
                let locale = shared.config.locale_id.to_string();
                Logger::trace(
                    Event::CoordinatorCreated,
                    &[
                        ("coordinator_id", &id),
                        ("locale_id", &locale),
                        ("partition_id", &partition),
                    ],
                );
            }
        }

        Ok(CoordinatorHandle::new(
            coordinator,
            Completion::new(Arc::clone(shared), id),
        ))
    }

    /// Return a checked-out coordinator by id.
    ///
    /// Releasing a coordinator that is not checked out is a protocol
    /// invariant violation and does not return.
    pub fn release(&self, id: CoordinatorId) {
        self.shared.release(id);
    }

    /// Current occupancy.
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.lock();
        PoolStats {
            created: state.created.len(),
            free: state.free.len(),
            checked_out: state.checked_out.len(),
        }
    }

    /// Close the pool and destroy every coordinator it created, free or
    /// checked out, summing their timing.
    ///
    /// Destroying checked-out coordinators is only safe once nothing is in
    /// flight. Completions that arrive afterwards are ignored.
    pub fn drain_all(&self) -> CoordinatorTotals {
        let created = {
            let mut state = self.shared.lock();
            state.closed = true;
            state.free.clear();
            state.checked_out.clear();
            std::mem::take(&mut state.created)
        };

        let mut totals = CoordinatorTotals::default();
        for coordinator in created {
            totals.coordinators += 1;
            totals.stats += coordinator.stats();
        }
        totals
    }
}
