//! Control service state shared by the routes and the worker

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::observability::{Event, Logger, MetricsRegistry, MetricsSnapshot};
use crate::tracker::SubmissionTracker;

#[derive(Debug, Default)]
struct ShutdownState {
    requested: bool,
    last_heartbeat: Option<Instant>,
}

/// Readiness, heartbeat and shutdown signaling for one worker.
#[derive(Debug)]
pub struct ControlService {
    site_name: String,
    instance_id: Uuid,
    started_at: DateTime<Utc>,
    ctrl_timeout: Duration,
    ready: AtomicBool,
    state: Mutex<ShutdownState>,
    shutdown_cond: Condvar,
    metrics: Arc<MetricsRegistry>,
    tracker: Arc<SubmissionTracker>,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Always "ok" while the server answers
    pub status: &'static str,
    /// Site name from configuration
    pub site: String,
    /// Random id of this process instance
    pub instance_id: Uuid,
    /// Process start, RFC 3339
    pub started_at: DateTime<Utc>,
    /// Crate version
    pub version: &'static str,
    /// Whether the worker announced readiness
    pub ready: bool,
    /// Whether the supervisor heartbeat is within the control timeout
    pub supervised: bool,
}

/// Body of `GET /stats`.
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    /// Submissions not yet learned
    pub in_flight: u32,
    /// Worker counters
    pub metrics: MetricsSnapshot,
}

impl ControlService {
    /// Create a control service that is not ready yet.
    pub fn new(
        site_name: impl Into<String>,
        ctrl_timeout: Duration,
        metrics: Arc<MetricsRegistry>,
        tracker: Arc<SubmissionTracker>,
    ) -> Self {
        Self {
            site_name: site_name.into(),
            instance_id: Uuid::new_v4(),
            started_at: Utc::now(),
            ctrl_timeout,
            ready: AtomicBool::new(false),
            state: Mutex::new(ShutdownState::default()),
            shutdown_cond: Condvar::new(),
            metrics,
            tracker,
        }
    }

    /// Announce that the worker is serving.
    pub fn set_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    /// Whether readiness was announced and the server is not shutting down.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Record a supervisor heartbeat.
    pub fn heartbeat(&self) {
        self.lock().last_heartbeat = Some(Instant::now());
    }

    /// Whether a heartbeat arrived within the control timeout.
    pub fn supervised(&self) -> bool {
        self.lock()
            .last_heartbeat
            .map(|at| at.elapsed() <= self.ctrl_timeout)
            .unwrap_or(false)
    }

    /// Control timeout this service was configured with.
    pub fn ctrl_timeout(&self) -> Duration {
        self.ctrl_timeout
    }

    /// Ask the worker to shut down and wake every waiter.
    pub fn request_shutdown(&self) {
        let mut state = self.lock();
        if !state.requested {
            state.requested = true;
            Logger::info(Event::ShutdownRequested, &[("site", &self.site_name)]);
        }
        self.shutdown_cond.notify_all();
    }

    /// Whether shutdown was requested.
    pub fn shutdown_requested(&self) -> bool {
        self.lock().requested
    }

    /// Block until shutdown is requested. With a timeout, returns `false`
    /// if it elapsed first.
    pub fn wait_for_shutdown_request(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.lock();
        while !state.requested {
            state = match deadline {
                None => self
                    .shutdown_cond
                    .wait(state)
                    .unwrap_or_else(|poisoned| poisoned.into_inner()),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    self.shutdown_cond
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .0
                }
            };
        }
        true
    }

    /// Withdraw readiness as the control server goes down.
    pub fn server_shutdown(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    /// Snapshot for `GET /health`.
    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: "ok",
            site: self.site_name.clone(),
            instance_id: self.instance_id,
            started_at: self.started_at,
            version: env!("CARGO_PKG_VERSION"),
            ready: self.is_ready(),
            supervised: self.supervised(),
        }
    }

    /// Snapshot for `GET /stats`.
    pub fn stats(&self) -> StatsReport {
        StatsReport {
            in_flight: self.tracker.in_flight(),
            metrics: self.metrics.snapshot(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ShutdownState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
