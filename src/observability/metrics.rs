//! Worker counters
//!
//! Counters only, monotonic, reset on process start. Relaxed atomics: the
//! values are read for reporting, never for coordination.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters of one worker.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    submissions_accepted: AtomicU64,
    rejected_not_leader: AtomicU64,
    rejected_backpressure: AtomicU64,
    commands_learned: AtomicU64,
    bytes_learned: AtomicU64,
    apply_failures: AtomicU64,
    coordinators_created: AtomicU64,
}

impl MetricsRegistry {
    /// Create a registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Count an accepted submission
    pub fn increment_accepted(&self) {
        self.submissions_accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a submission rejected on a non-leader
    pub fn increment_rejected_not_leader(&self) {
        self.rejected_not_leader.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a submission rejected by pool exhaustion
    pub fn increment_rejected_backpressure(&self) {
        self.rejected_backpressure.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a learned command and its payload size
    pub fn record_learned(&self, bytes: usize) {
        self.commands_learned.fetch_add(1, Ordering::Relaxed);
        self.bytes_learned.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Count a learned command whose callback panicked
    pub fn increment_apply_failures(&self) {
        self.apply_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a newly constructed coordinator
    pub fn increment_coordinators_created(&self) {
        self.coordinators_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            submissions_accepted: self.submissions_accepted.load(Ordering::Relaxed),
            rejected_not_leader: self.rejected_not_leader.load(Ordering::Relaxed),
            rejected_backpressure: self.rejected_backpressure.load(Ordering::Relaxed),
            commands_learned: self.commands_learned.load(Ordering::Relaxed),
            bytes_learned: self.bytes_learned.load(Ordering::Relaxed),
            apply_failures: self.apply_failures.load(Ordering::Relaxed),
            coordinators_created: self.coordinators_created.load(Ordering::Relaxed),
        }
    }
}

/// Copy of the counters, as served by the control endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MetricsSnapshot {
    /// Submissions handed to a coordinator
    pub submissions_accepted: u64,
    /// Submissions rejected because this node is not the leader
    pub rejected_not_leader: u64,
    /// Submissions rejected because the pool was exhausted
    pub rejected_backpressure: u64,
    /// Commands delivered by the learner
    pub commands_learned: u64,
    /// Payload bytes delivered by the learner
    pub bytes_learned: u64,
    /// Learned commands whose application callback panicked
    pub apply_failures: u64,
    /// Coordinators constructed by the pool
    pub coordinators_created: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_new_registry_is_zero() {
        assert_eq!(MetricsRegistry::new().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_counters() {
        let metrics = MetricsRegistry::new();
        metrics.increment_accepted();
        metrics.increment_rejected_not_leader();
        metrics.increment_rejected_backpressure();
        metrics.record_learned(4);
        metrics.record_learned(6);
        metrics.increment_coordinators_created();
        metrics.increment_apply_failures();

        let snap = metrics.snapshot();
        assert_eq!(snap.submissions_accepted, 1);
        assert_eq!(snap.rejected_not_leader, 1);
        assert_eq!(snap.rejected_backpressure, 1);
        assert_eq!(snap.commands_learned, 2);
        assert_eq!(snap.bytes_learned, 10);
        assert_eq!(snap.coordinators_created, 1);
        assert_eq!(snap.apply_failures, 1);
    }

    #[test]
    fn test_thread_safety() {
        let metrics = Arc::new(MetricsRegistry::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let metrics = Arc::clone(&metrics);
                thread::spawn(move || {
                    for _ in 0..500 {
                        metrics.record_learned(1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(metrics.snapshot().commands_learned, 2000);
    }

    #[test]
    fn test_snapshot_serializes() {
        let json = serde_json::to_value(MetricsRegistry::new().snapshot()).unwrap();
        assert_eq!(json["commands_learned"], 0);
    }
}
