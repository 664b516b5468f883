//! # Frame Errors
//!
//! Decode-time wire-format violations. These are recoverable for the caller
//! of `decode`: the offending message is discarded.

use thiserror::Error;

/// Result type for frame operations
pub type FrameResult<T> = Result<T, FrameError>;

/// Command frame errors
#[derive(Debug, Error)]
pub enum FrameError {
    /// Stream ended before the declared number of bytes was read
    #[error("Truncated frame: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes required to complete the field being read
        expected: usize,
        /// Bytes actually available
        actual: usize,
    },

    /// Kind discriminator is not one this layer understands
    #[error("Unknown command kind: {0}")]
    UnknownKind(u16),

    /// Payload does not fit the u32 length field
    #[error("Payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    /// Underlying stream failed
    #[error("Frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// Whether the frame was cut short.
    pub fn is_truncated(&self) -> bool {
        matches!(self, Self::Truncated { .. })
    }
}
