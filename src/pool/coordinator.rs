//! Checked-out coordinators and their completion tokens

use std::fmt;
use std::ops::AddAssign;
use std::sync::Arc;
use std::time::Duration;

use crate::command::{CommandCodec, CommandEnvelope};
use crate::protocol::{Coordinator, CoordinatorId, LocaleId, PartitionId, ProposalResult};

use super::pool::PoolShared;

/// Settings every coordinator of a pool is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Partition of the owning site
    pub partition_id: PartitionId,
    /// Locale of the owning site
    pub locale_id: LocaleId,
    /// Codec used to turn envelopes into log entries
    pub codec: CommandCodec,
}

/// Timing of the instances one coordinator drove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CoordinatorStats {
    /// Instances started
    pub instances: u64,
    /// Time spent handing commands to the replication layer
    pub submit_time: Duration,
    /// Time from submission until the command was learned
    pub commit_time: Duration,
}

impl AddAssign for CoordinatorStats {
    fn add_assign(&mut self, other: Self) {
        self.instances += other.instances;
        self.submit_time += other.submit_time;
        self.commit_time += other.commit_time;
    }
}

/// Sum of the stats of every coordinator a pool created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CoordinatorTotals {
    /// Coordinators destroyed
    pub coordinators: usize,
    /// Summed per-coordinator stats
    pub stats: CoordinatorStats,
}

impl fmt::Display for CoordinatorTotals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "coordinators={} instances={} submit={:.6}s commit={:.6}s",
            self.coordinators,
            self.stats.instances,
            self.stats.submit_time.as_secs_f64(),
            self.stats.commit_time.as_secs_f64()
        )
    }
}

/// Returns a coordinator to its pool, exactly once.
///
/// Consumed by [`Completion::complete`]. Dropping an unused token releases
/// the coordinator as well, so an instance abandoned by the protocol cannot
/// leak its coordinator.
pub struct Completion {
    pool: Option<Arc<PoolShared>>,
    id: CoordinatorId,
}

impl Completion {
    pub(super) fn new(pool: Arc<PoolShared>, id: CoordinatorId) -> Self {
        Self {
            pool: Some(pool),
            id,
        }
    }

    /// Coordinator this token releases.
    pub fn coordinator_id(&self) -> CoordinatorId {
        self.id
    }

    /// Report that the coordinator's instance finished.
    pub fn complete(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.release(self.id);
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("coordinator_id", &self.id)
            .field("pending", &self.pool.is_some())
            .finish()
    }
}

/// A coordinator checked out of the pool for one submission.
pub struct CoordinatorHandle {
    coordinator: Arc<dyn Coordinator>,
    completion: Completion,
}

impl CoordinatorHandle {
    pub(super) fn new(coordinator: Arc<dyn Coordinator>, completion: Completion) -> Self {
        Self {
            coordinator,
            completion,
        }
    }

    /// Identifier of the checked-out coordinator.
    pub fn id(&self) -> CoordinatorId {
        self.completion.coordinator_id()
    }

    /// Drive consensus for `envelope`. Returns without waiting for it.
    ///
    /// On error the coordinator is already back in the pool.
    pub fn submit(self, envelope: CommandEnvelope) -> ProposalResult<()> {
        let Self {
            coordinator,
            completion,
        } = self;
        coordinator.submit(envelope, completion)
    }

    /// Give the coordinator back without submitting anything.
    pub fn release(self) {
        self.completion.complete();
    }
}

impl fmt::Debug for CoordinatorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoordinatorHandle")
            .field("id", &self.id())
            .finish()
    }
}
