//! Protocol invariant violations
//!
//! A violation means this layer and the replication layer disagree about
//! their shared contract (an undecodable learned command, a coordinator
//! released twice). Such states are never recovered locally: the violation
//! is logged at FATAL severity and the process aborts, without unwinding,
//! whichever thread detected it and however the crate is linked.
//!
//! Unit tests of this crate swap the abort for a panic so the violation
//! can be asserted with `#[should_panic]`.

use std::any::Any;
use std::fmt;

use crate::observability::{Event, Logger};

/// Report a protocol invariant violation and terminate.
#[track_caller]
pub fn violation(invariant: &str, detail: impl fmt::Display) -> ! {
    let detail = detail.to_string();
    Logger::fatal(
        Event::ProtocolInvariantViolation,
        &[("invariant", invariant), ("detail", &detail)],
    );
    terminate(invariant, &detail)
}

#[cfg(not(test))]
fn terminate(_invariant: &str, _detail: &str) -> ! {
    std::process::abort()
}

#[cfg(test)]
#[track_caller]
fn terminate(invariant: &str, detail: &str) -> ! {
    panic!("protocol invariant violation [{}]: {}", invariant, detail)
}

/// Message carried by a caught panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
