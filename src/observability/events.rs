//! Observable events
//!
//! Every log line names exactly one of these events. Names are stable and
//! uppercase so log processors can match on them.

use std::fmt;

/// Events emitted by the worker and its components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    /// Scheduler and pool constructed
    BaseReady,
    /// Communication channel attached to the scheduler
    CommoReady,
    /// RPC server is starting to bind
    ServiceStarting,
    /// RPC server listening
    ServiceReady,
    /// Control server listening
    HeartbeatReady,
    /// Worker accepts submissions
    WorkerRunning,
    /// Shutdown initiated
    ShutdownStart,
    /// Heartbeat server stopped
    HeartbeatStopped,
    /// Average flush statistics of a recorder
    FlushStats,
    /// Services being torn down
    ServicesStopping,
    /// Coordinator timing totals
    CoordinatorTotals,
    /// Shutdown complete
    ShutdownComplete,

    // Submission path
    /// Submission accepted
    SubmitAccepted,
    /// Submission rejected on a non-leader
    SubmitRejectedNotLeader,
    /// Submission rejected by pool exhaustion
    SubmitRejectedBackpressure,
    /// New coordinator constructed
    CoordinatorCreated,
    /// Coordinator returned to the pool
    CoordinatorReleased,
    /// Completion arrived after the pool was closed
    ReleaseAfterClose,

    // Learn path
    /// Learned command applied
    CommandLearned,
    /// Application callback panicked on a learned command
    ApplyCallbackPanicked,
    /// Waiting for in-flight submissions
    DrainWaiting,
    /// In-flight count reached zero
    DrainComplete,

    // Control endpoint
    /// Shutdown requested through the control endpoint
    ShutdownRequested,

    // Failures
    /// Server bind failed
    BindFailed,
    /// RPC connection failed
    RpcConnectionError,
    /// Local scheduler lost a proposal
    ProposalDropped,
    /// Contract between this layer and the replication layer broken
    ProtocolInvariantViolation,
}

impl Event {
    /// Stable event name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::BaseReady => "BASE_READY",
            Event::CommoReady => "COMMO_READY",
            Event::ServiceStarting => "SERVICE_STARTING",
            Event::ServiceReady => "SERVICE_READY",
            Event::HeartbeatReady => "HEARTBEAT_READY",
            Event::WorkerRunning => "WORKER_RUNNING",
            Event::ShutdownStart => "SHUTDOWN_START",
            Event::HeartbeatStopped => "HEARTBEAT_STOPPED",
            Event::FlushStats => "FLUSH_STATS",
            Event::ServicesStopping => "SERVICES_STOPPING",
            Event::CoordinatorTotals => "COORDINATOR_TOTALS",
            Event::ShutdownComplete => "SHUTDOWN_COMPLETE",
            Event::SubmitAccepted => "SUBMIT_ACCEPTED",
            Event::SubmitRejectedNotLeader => "SUBMIT_REJECTED_NOT_LEADER",
            Event::SubmitRejectedBackpressure => "SUBMIT_REJECTED_BACKPRESSURE",
            Event::CoordinatorCreated => "COORDINATOR_CREATED",
            Event::CoordinatorReleased => "COORDINATOR_RELEASED",
            Event::ReleaseAfterClose => "RELEASE_AFTER_CLOSE",
            Event::CommandLearned => "COMMAND_LEARNED",
            Event::ApplyCallbackPanicked => "APPLY_CALLBACK_PANICKED",
            Event::DrainWaiting => "DRAIN_WAITING",
            Event::DrainComplete => "DRAIN_COMPLETE",
            Event::ShutdownRequested => "SHUTDOWN_REQUESTED",
            Event::BindFailed => "BIND_FAILED",
            Event::RpcConnectionError => "RPC_CONNECTION_ERROR",
            Event::ProposalDropped => "PROPOSAL_DROPPED",
            Event::ProtocolInvariantViolation => "PROTOCOL_INVARIANT_VIOLATION",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
