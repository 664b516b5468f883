//! # Pool Errors

use thiserror::Error;

/// Result type for pool operations
pub type PoolResult<T> = Result<T, PoolError>;

/// Coordinator pool errors
///
/// Both are backpressure, not failures: the caller retries later or
/// applies flow control.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// Every coordinator that may exist is checked out
    #[error("Coordinator pool exhausted ({max} coordinators in flight)")]
    Exhausted {
        /// Maximum number of coordinators
        max: usize,
    },

    /// The pool was torn down during shutdown
    #[error("Coordinator pool closed")]
    Closed,
}
