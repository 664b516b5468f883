//! Coordinator pool
//!
//! Coordinators are expensive protocol objects that drive one consensus
//! instance at a time. The pool creates them on demand up to
//! [`MAX_COORDINATORS`], hands them out one submission at a time, and takes
//! them back when their instance completes.
//!
//! Reuse order is most-recently-freed first. A coordinator is returned
//! through the [`Completion`] token handed to it with the submission, so
//! release happens exactly once per acquire.

mod coordinator;
mod errors;
mod pool;

pub use coordinator::{
    Completion, CoordinatorConfig, CoordinatorHandle, CoordinatorStats, CoordinatorTotals,
};
pub use errors::{PoolError, PoolResult};
pub use pool::{CoordinatorPool, PoolStats, MAX_COORDINATORS};
