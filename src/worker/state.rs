//! Worker lifecycle state machine
//!
//! Setup runs in a fixed order, each step building on the previous one:
//!
//! ```text
//! Unconfigured -> BaseReady -> CommoReady -> ServiceReady
//!     -> [HeartbeatReady] -> Running -> ShuttingDown -> Stopped
//! ```
//!
//! `HeartbeatReady` is skipped when the heartbeat server is disabled.
//! Shutdown may begin from any state that is not already shutting down, so
//! a worker whose setup failed halfway can still be torn down.

use super::errors::{HostError, HostResult};

/// Lifecycle state of a replication worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerState {
    /// Nothing constructed yet
    #[default]
    Unconfigured,

    /// Scheduler and coordinator pool exist
    BaseReady,

    /// Communication channel attached to the scheduler
    CommoReady,

    /// RPC server listening with every service registered
    ServiceReady,

    /// Control server listening
    HeartbeatReady,

    /// Accepting submissions
    Running,

    /// Draining and releasing resources
    ShuttingDown,

    /// Every resource released
    Stopped,
}

impl WorkerState {
    /// Whether `next` directly follows this state.
    pub fn can_transition_to(self, next: WorkerState) -> bool {
        use WorkerState::*;
        match (self, next) {
            (Unconfigured, BaseReady) => true,
            (BaseReady, CommoReady) => true,
            (CommoReady, ServiceReady) => true,
            (ServiceReady, HeartbeatReady) => true,
            (ServiceReady, Running) | (HeartbeatReady, Running) => true,
            (ShuttingDown, Stopped) => true,
            (ShuttingDown, _) | (Stopped, _) => false,
            (_, ShuttingDown) => true,
            _ => false,
        }
    }

    /// Validate and return the next state.
    pub fn advance(self, next: WorkerState) -> HostResult<WorkerState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(HostError::illegal_transition(format!(
                "cannot move from {} to {}",
                self.state_name(),
                next.state_name()
            )))
        }
    }

    /// Check if submissions are accepted in this state.
    pub fn accepts_submissions(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Check if every resource has been released.
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// Get state name for observability.
    pub fn state_name(&self) -> &'static str {
        match self {
            Self::Unconfigured => "unconfigured",
            Self::BaseReady => "base_ready",
            Self::CommoReady => "commo_ready",
            Self::ServiceReady => "service_ready",
            Self::HeartbeatReady => "heartbeat_ready",
            Self::Running => "running",
            Self::ShuttingDown => "shutting_down",
            Self::Stopped => "stopped",
        }
    }
}
