//! Heartbeat and control endpoint
//!
//! An HTTP server, independent of the RPC server, bound on
//! `base_port + CONTROL_PORT_DELTA`. An external supervisor uses it to
//! learn when the worker is ready, to keep a heartbeat going, and to ask
//! the worker to shut down.

mod routes;
mod server;
mod service;

pub use routes::control_routes;
pub use server::ControlServer;
pub use service::{ControlService, HealthReport, StatsReport};

/// Offset of the control port from the site's RPC port.
pub const CONTROL_PORT_DELTA: u16 = 10000;
