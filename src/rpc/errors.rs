//! # RPC Errors

use std::io;

use thiserror::Error;

/// Result type for RPC operations
pub type RpcResult<T> = Result<T, RpcError>;

/// RPC server and client errors
#[derive(Debug, Error)]
pub enum RpcError {
    /// Listening socket could not be bound
    #[error("Failed to bind {address}: {source}")]
    Bind {
        /// Address the server tried to bind
        address: String,
        /// Underlying socket error
        #[source]
        source: io::Error,
    },

    /// Runtime for the server could not be built
    #[error("Failed to build server runtime: {0}")]
    Runtime(#[source] io::Error),

    /// Server was started twice
    #[error("Server already started on {0}")]
    AlreadyStarted(std::net::SocketAddr),

    /// Frame larger than the protocol allows
    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(usize),

    /// Malformed frame
    #[error("Malformed frame: {0}")]
    Malformed(String),

    /// Server answered with a non-ok status
    #[error("Service {service} answered with status {status}")]
    Status {
        /// Service the request addressed
        service: u32,
        /// Status byte returned
        status: u8,
    },

    /// Socket failure
    #[error("RPC I/O error: {0}")]
    Io(#[from] io::Error),
}

impl RpcError {
    /// Whether the error happened while binding the listener.
    pub fn is_bind_failure(&self) -> bool {
        matches!(self, Self::Bind { .. })
    }
}
