//! # Proposal Errors
//!
//! A coordinator that cannot hand a command to the replication layer says
//! so synchronously. The command was not proposed and will never be
//! learned; the coordinator has already gone back to the pool.

use thiserror::Error;

use crate::command::FrameError;

/// Result type for coordinator submissions
pub type ProposalResult<T> = Result<T, ProposalError>;

/// Reasons a coordinator refused a command
#[derive(Debug, Error)]
pub enum ProposalError {
    /// Replication layer no longer takes proposals
    #[error("Replication layer stopped: {0}")]
    Stopped(String),

    /// Command could not be framed for the log
    #[error("Proposal not framed: {0}")]
    Frame(#[from] FrameError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = ProposalError::Stopped("scheduler stopped".to_string());
        assert_eq!(err.to_string(), "Replication layer stopped: scheduler stopped");

        let err = ProposalError::from(FrameError::PayloadTooLarge(7));
        assert_eq!(err.to_string(), "Proposal not framed: Payload too large: 7 bytes");
    }
}
