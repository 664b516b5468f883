//! RPC server
//!
//! A length-framed TCP server hosting the services produced by the
//! replication protocol. Each server owns its own tokio runtime: the IO
//! worker threads play the role of the poll manager and the blocking pool
//! runs service handlers, so a slow handler never stalls socket IO.
//!
//! Wire format (little-endian):
//!
//! ```text
//! request:  [len: u32][service: u32][body: len - 4 bytes]
//! response: [len: u32][status: u8][body: len - 1 bytes]
//! ```

mod errors;
mod server;
mod wire;

pub use errors::{RpcError, RpcResult};
pub use server::{RpcServer, ServerThreads};
pub use wire::{call, ResponseStatus, MAX_FRAME_LEN};

/// Identifier a service is registered under.
pub type ServiceId = u32;

/// A request handler registered on an [`RpcServer`].
pub trait RpcService: Send + Sync {
    /// Identifier requests address.
    fn id(&self) -> ServiceId;

    /// Human-readable name, for logs.
    fn name(&self) -> &str;

    /// Handle one request body and produce the response body.
    ///
    /// Runs on the server's blocking pool.
    fn handle(&self, request: &[u8]) -> Vec<u8>;

    /// Flush statistics, for services that persist log batches.
    fn recorder(&self) -> Option<&dyn FlushRecorder> {
        None
    }
}

/// Running averages of log flushes.
pub trait FlushRecorder: Send + Sync {
    /// Average number of entries written per flush.
    fn average_entries_per_flush(&self) -> u64;

    /// Average number of bytes written per flush.
    fn average_bytes_per_flush(&self) -> u64;
}
