//! Learner bridge
//!
//! The scheduler calls [`LearnerBridge::deliver`] once for every learned
//! command, in log order, on a replication-owned thread. The bridge decodes
//! the frame, hands the payload to the application callback, and ends the
//! submission in the tracker. It never reorders, skips or batches.
//!
//! A frame that does not decode to a container command means the two sides
//! of the contract diverged; that is a protocol invariant violation.
//!
//! A panicking callback does not take the replication thread down with it.
//! The panic is caught, logged and counted, and the submission still ends.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use crate::command::{CommandCodec, CommandKind};
use crate::invariant;
use crate::observability::{Event, Logger, MetricsRegistry, Severity};
use crate::protocol::LearnerAction;
use crate::tracker::SubmissionTracker;

/// Application callback, invoked with a borrowed view of each learned
/// payload.
pub type ApplyCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Delivers learned commands to the application.
pub struct LearnerBridge {
    codec: CommandCodec,
    tracker: Arc<SubmissionTracker>,
    metrics: Arc<MetricsRegistry>,
    callback: RwLock<Option<ApplyCallback>>,
}

impl LearnerBridge {
    /// Create a bridge with no callback registered.
    pub fn new(
        codec: CommandCodec,
        tracker: Arc<SubmissionTracker>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            codec,
            tracker,
            metrics,
            callback: RwLock::new(None),
        }
    }

    /// Install the application callback, replacing any earlier one.
    pub fn set_callback(&self, callback: ApplyCallback) {
        *self
            .callback
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(callback);
    }

    /// Whether a callback is installed.
    pub fn has_callback(&self) -> bool {
        self.callback
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }

    fn current_callback(&self) -> Option<ApplyCallback> {
        self.callback
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl LearnerAction for LearnerBridge {
    fn deliver(&self, frame: &[u8]) {
        let envelope = match self.codec.decode(frame) {
            Ok(envelope) => envelope,
            Err(e) => invariant::violation("learned_command_decodes", e),
        };

        match envelope.kind() {
            CommandKind::Container => {
                if let Some(callback) = self.current_callback() {
                    let payload = envelope.payload();
                    if let Err(panic) =
                        panic::catch_unwind(AssertUnwindSafe(|| callback(payload)))
                    {
                        self.metrics.increment_apply_failures();
                        let bytes = envelope.length().to_string();
                        let detail = invariant::panic_message(panic.as_ref());
                        Logger::error(
                            Event::ApplyCallbackPanicked,
                            &[("bytes", &bytes), ("detail", &detail)],
                        );
                    }
                }
            }
        }

        self.metrics.record_learned(envelope.length());
        if Logger::enabled(Severity::Trace) {
            let bytes = envelope.length().to_string();
            Logger::trace(Event::CommandLearned, &[("bytes", &bytes)]);
        }
        self.tracker.end();
    }
}

impl fmt::Debug for LearnerBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LearnerBridge")
            .field("codec", &self.codec)
            .field("has_callback", &self.has_callback())
            .finish()
    }
}
