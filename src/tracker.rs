//! Submission tracker
//!
//! Counts submissions that were accepted but not yet learned, and lets a
//! caller block until that count reaches zero.
//!
//! Lock: one `Mutex<u32>` plus a `Condvar`. The critical sections are a
//! single increment or decrement. This lock is never held together with
//! the coordinator pool lock.
//!
//! `drain` only guarantees that the counter was observed at zero during
//! the call. New submissions may begin as soon as it returns.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::observability::{Event, Logger};

/// In-flight submission counter with a blocking drain.
#[derive(Debug, Default)]
pub struct SubmissionTracker {
    in_flight: Mutex<u32>,
    drained: Condvar,
}

impl SubmissionTracker {
    /// Create a tracker with nothing in flight.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a submission entering the pipeline.
    pub fn begin(&self) {
        let mut in_flight = self.lock();
        *in_flight += 1;
    }

    /// Record a learned submission.
    ///
    /// At zero this is a no-op: followers learn every command in the log but
    /// never began any of them.
    pub fn end(&self) {
        let mut in_flight = self.lock();
        if *in_flight == 0 {
            return;
        }
        *in_flight -= 1;
        if *in_flight == 0 {
            self.drained.notify_all();
        }
    }

    /// Current number of submissions in flight.
    pub fn in_flight(&self) -> u32 {
        *self.lock()
    }

    /// Block until nothing is in flight.
    pub fn drain(&self) {
        let mut in_flight = self.lock();
        while *in_flight > 0 {
            let pending = in_flight.to_string();
            Logger::trace(Event::DrainWaiting, &[("in_flight", &pending)]);
            in_flight = self
                .drained
                .wait(in_flight)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        Logger::trace(Event::DrainComplete, &[]);
    }

    /// Block until nothing is in flight or `timeout` elapses.
    ///
    /// Returns `true` if the counter was observed at zero.
    pub fn drain_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut in_flight = self.lock();
        while *in_flight > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .drained
                .wait_timeout(in_flight, deadline - now)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            in_flight = guard;
        }
        true
    }

    // A panicking callback must not wedge every later submission.
    fn lock(&self) -> MutexGuard<'_, u32> {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
