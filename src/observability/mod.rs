//! Observability
//!
//! - Structured JSON logging with a process-wide severity floor
//! - Named events
//! - Atomic counters, served by the control endpoint
//!
//! ```ignore
//! use paxgate::observability::{Event, Logger};
//!
//! Logger::info(Event::ServiceReady, &[("address", "0.0.0.0:8100")]);
//! ```

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
