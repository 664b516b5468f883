//! Replication protocol seam
//!
//! The consensus phases (proposal numbering, quorum intersection, conflict
//! recovery) live behind these traits. The worker depends only on the
//! factory operations of [`ReplicationProtocol`] and on the small
//! capabilities of the objects it returns; it never inspects protocol state.
//!
//! [`local::LocalProtocol`] is an in-process single-node implementation used
//! by the CLI and the tests.

mod errors;
pub mod local;

use std::sync::Arc;

use crate::command::CommandEnvelope;
use crate::pool::{Completion, CoordinatorConfig, CoordinatorStats};
use crate::rpc::RpcService;

pub use errors::{ProposalError, ProposalResult};

/// Process-wide coordinator identifier, assigned by the pool from 0.
pub type CoordinatorId = u32;

/// Identifier of a site (one replica process) in the cluster.
pub type SiteId = u32;

/// Partition a site belongs to.
pub type PartitionId = u32;

/// Role of a site within its partition. Locale 0 is the leader.
pub type LocaleId = u32;

/// Locale of the site that originates submissions.
pub const LEADER_LOCALE: LocaleId = 0;

/// Entry point invoked by the scheduler for every learned command.
///
/// Called once per learned command, in log order, on a thread owned by the
/// replication layer. `frame` is the encoded command envelope.
pub trait LearnerAction: Send + Sync {
    /// Handle one learned command.
    fn deliver(&self, frame: &[u8]);
}

/// Orders and learns commands for one site.
pub trait Scheduler: Send + Sync {
    /// Bind the scheduler to this site's locale.
    fn set_locale(&self, locale_id: LocaleId);

    /// Attach the inter-site communication channel.
    fn attach_channel(&self, channel: Arc<dyn CommunicationChannel>);

    /// Register the action invoked for every learned command.
    fn register_learner(&self, learner: Arc<dyn LearnerAction>);

    /// Stop scheduling. Called once during shutdown.
    fn stop(&self) {}
}

/// Inter-site communication channel used by the scheduler.
pub trait CommunicationChannel: Send + Sync {
    /// Bind the channel to this site's locale.
    fn set_locale(&self, locale_id: LocaleId);

    /// Locale the channel sends from.
    fn locale(&self) -> LocaleId;
}

/// Drives one consensus instance at a time.
pub trait Coordinator: Send + Sync {
    /// Identifier assigned by the pool.
    fn id(&self) -> CoordinatorId;

    /// Start driving consensus for `envelope` and return immediately.
    ///
    /// The coordinator owns `completion` until its instance finishes, then
    /// calls [`Completion::complete`] exactly once. Dropping the token has
    /// the same effect.
    ///
    /// An error means the command was never proposed and will not be
    /// learned. `completion` is dropped before returning it.
    fn submit(&self, envelope: CommandEnvelope, completion: Completion) -> ProposalResult<()>;

    /// Accumulated timing of every instance this coordinator drove.
    fn stats(&self) -> CoordinatorStats;
}

/// Factory for every protocol object the worker needs.
pub trait ReplicationProtocol: Send + Sync {
    /// Create the scheduler for this site.
    fn create_scheduler(&self) -> Arc<dyn Scheduler>;

    /// Create the RPC services this protocol serves.
    fn create_rpc_services(
        &self,
        site_id: SiteId,
        scheduler: &Arc<dyn Scheduler>,
    ) -> Vec<Arc<dyn RpcService>>;

    /// Create the inter-site communication channel, if the protocol has one.
    fn create_communication_channel(&self) -> Option<Arc<dyn CommunicationChannel>>;

    /// Create a coordinator with the given identifier.
    fn create_coordinator(&self, id: CoordinatorId, config: &CoordinatorConfig)
        -> Arc<dyn Coordinator>;
}
