//! Worker error types
//!
//! Rejections (`NotLeader`, `Backpressure`) are expected outcomes of a
//! submission and leave the worker healthy. A bind failure at startup is
//! fatal for the process.

use std::fmt;

/// Worker error type
#[derive(Debug, Clone)]
pub struct HostError {
    /// Error kind
    pub kind: HostErrorKind,
    /// Error message
    pub message: String,
}

/// Worker error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostErrorKind {
    /// Submission attempted on a site that is not the leader
    NotLeader,

    /// Every coordinator is busy; retry later
    Backpressure,

    /// Submission attempted while the worker is not running
    NotRunning,

    /// Lifecycle step called out of order
    IllegalTransition,

    /// A server could not be started on its address
    BindFailure,

    /// Configuration is missing or invalid
    Configuration,

    /// Command cannot be framed
    Frame,
}

impl HostError {
    /// Create a new worker error.
    pub fn new(kind: HostErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create a not-leader rejection.
    pub fn not_leader(message: impl Into<String>) -> Self {
        Self::new(HostErrorKind::NotLeader, message)
    }

    /// Create a backpressure rejection.
    pub fn backpressure(message: impl Into<String>) -> Self {
        Self::new(HostErrorKind::Backpressure, message)
    }

    /// Create a not-running error.
    pub fn not_running(message: impl Into<String>) -> Self {
        Self::new(HostErrorKind::NotRunning, message)
    }

    /// Create an illegal transition error.
    pub fn illegal_transition(message: impl Into<String>) -> Self {
        Self::new(HostErrorKind::IllegalTransition, message)
    }

    /// Create a bind failure.
    pub fn bind_failure(message: impl Into<String>) -> Self {
        Self::new(HostErrorKind::BindFailure, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(HostErrorKind::Configuration, message)
    }

    /// Create a framing error.
    pub fn frame(message: impl Into<String>) -> Self {
        Self::new(HostErrorKind::Frame, message)
    }

    /// Check if this error is fatal (the process cannot serve).
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, HostErrorKind::BindFailure)
    }

    /// Check if the submission may be retried unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, HostErrorKind::Backpressure)
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostError({:?}): {}", self.kind, self.message)
    }
}

impl std::error::Error for HostError {}

/// Result type for worker operations
pub type HostResult<T> = Result<T, HostError>;
