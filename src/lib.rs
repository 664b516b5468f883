//! paxgate - host-side orchestration in front of a Paxos replicated log
//!
//! Frames application commands, admits them on the leader, drives them
//! through a bounded coordinator pool, delivers learned commands to the
//! application and drains in-flight work on shutdown.

pub mod cli;
pub mod command;
pub mod config;
pub mod control;
pub mod invariant;
pub mod learner;
pub mod observability;
pub mod pool;
pub mod protocol;
pub mod rpc;
pub mod tracker;
pub mod worker;
