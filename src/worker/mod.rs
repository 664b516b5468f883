//! Replication worker
//!
//! The host-side facade applications talk to. It wires a
//! [`ReplicationProtocol`](crate::protocol::ReplicationProtocol) to the
//! coordinator pool, the learner bridge and the servers, gates submissions
//! on leadership and pool capacity, and drains in-flight work on shutdown.

mod errors;
mod state;
mod worker;

pub use errors::{HostError, HostErrorKind, HostResult};
pub use state::WorkerState;
pub use worker::{ReplicationWorker, Submission, EXAMPLE_COMMAND};
