//! In-process replication protocol
//!
//! A single-site protocol: every proposal is chosen in the order it reaches
//! the scheduler. One scheduler thread drains the proposal queue in
//! batches, "flushes" each batch to its in-memory log, releases the
//! coordinators, and delivers the batch to the learner one command at a
//! time in slot order. Batches form only from proposals that are already
//! queued; there is no timer.
//!
//! A stopped scheduler refuses proposals synchronously. A learner that
//! unwinds is a protocol invariant violation.
//!
//! It exists so the worker can run end to end without a cluster.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use serde_json::json;

use crate::command::CommandEnvelope;
use crate::invariant;
use crate::observability::{Event, Logger};
use crate::pool::{Completion, CoordinatorConfig, CoordinatorStats};
use crate::rpc::{FlushRecorder, RpcService, ServiceId};

use super::{
    CommunicationChannel, Coordinator, CoordinatorId, LearnerAction, LocaleId, ProposalError,
    ProposalResult, ReplicationProtocol, Scheduler, SiteId,
};

/// Service id of the log status service.
pub const LOG_SERVICE_ID: ServiceId = 1;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Running flush statistics of the in-memory log.
#[derive(Debug, Default)]
pub struct FlushStats {
    flushes: AtomicU64,
    entries: AtomicU64,
    bytes: AtomicU64,
}

impl FlushStats {
    fn record(&self, entries: u64, bytes: u64) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.entries.fetch_add(entries, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Number of flushes so far.
    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    fn average(&self, total: &AtomicU64) -> u64 {
        match self.flushes() {
            0 => 0,
            flushes => total.load(Ordering::Relaxed) / flushes,
        }
    }
}

impl FlushRecorder for FlushStats {
    fn average_entries_per_flush(&self) -> u64 {
        self.average(&self.entries)
    }

    fn average_bytes_per_flush(&self) -> u64 {
        self.average(&self.bytes)
    }
}

/// Communication channel of a single-site cluster.
#[derive(Debug, Default)]
pub struct LocalChannel {
    locale: AtomicU32,
}

impl CommunicationChannel for LocalChannel {
    fn set_locale(&self, locale_id: LocaleId) {
        self.locale.store(locale_id, Ordering::Relaxed);
    }

    fn locale(&self) -> LocaleId {
        self.locale.load(Ordering::Relaxed)
    }
}

struct Proposal {
    frame: Vec<u8>,
    completion: Completion,
    stats: Arc<Mutex<CoordinatorStats>>,
    proposed_at: Instant,
}

#[derive(Default)]
struct SchedulerShared {
    learner: RwLock<Option<Arc<dyn LearnerAction>>>,
    channel: RwLock<Option<Arc<dyn CommunicationChannel>>>,
    locale: AtomicU32,
    next_slot: AtomicU64,
    flush: Arc<FlushStats>,
}

/// Scheduler that chooses proposals in arrival order.
pub struct LocalScheduler {
    sender: Mutex<Option<Sender<Proposal>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    shared: Arc<SchedulerShared>,
}

impl LocalScheduler {
    /// Create the scheduler and start its thread.
    pub fn start() -> Arc<Self> {
        let (sender, receiver) = mpsc::channel();
        let shared = Arc::new(SchedulerShared::default());
        let worker = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("paxgate-scheduler".to_string())
                .spawn(move || run_scheduler(receiver, shared))
                .ok()
        };
        if worker.is_none() {
            Logger::error(
                Event::ProposalDropped,
                &[("detail", "scheduler thread could not be spawned")],
            );
        }

        Arc::new(Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(worker),
            shared,
        })
    }

    /// Number of commands learned so far. Also the next slot to fill.
    pub fn learned(&self) -> u64 {
        self.shared.next_slot.load(Ordering::SeqCst)
    }

    /// Locale this scheduler was bound to.
    pub fn locale(&self) -> LocaleId {
        self.shared.locale.load(Ordering::Relaxed)
    }

    /// Whether a communication channel is attached.
    pub fn has_channel(&self) -> bool {
        self.shared
            .channel
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }

    /// Flush statistics of the in-memory log.
    pub fn flush_stats(&self) -> Arc<FlushStats> {
        Arc::clone(&self.shared.flush)
    }

    /// Queue a proposal. A stopped scheduler hands it back.
    fn propose(&self, proposal: Proposal) -> Result<(), Proposal> {
        match lock(&self.sender).as_ref() {
            Some(sender) => sender.send(proposal).map_err(|e| e.0),
            None => Err(proposal),
        }
    }
}

impl Scheduler for LocalScheduler {
    fn set_locale(&self, locale_id: LocaleId) {
        self.shared.locale.store(locale_id, Ordering::Relaxed);
    }

    fn attach_channel(&self, channel: Arc<dyn CommunicationChannel>) {
        *self
            .shared
            .channel
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(channel);
    }

    fn register_learner(&self, learner: Arc<dyn LearnerAction>) {
        *self
            .shared
            .learner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(learner);
    }

    fn stop(&self) {
        drop(lock(&self.sender).take());
        if let Some(worker) = lock(&self.worker).take() {
            // The last handle can be dropped by a completion on the scheduler
            // thread itself; it exits on its own once the sender is gone.
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}

impl Drop for LocalScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_scheduler(receiver: Receiver<Proposal>, shared: Arc<SchedulerShared>) {
    while let Ok(first) = receiver.recv() {
        let mut batch = vec![first];
        batch.extend(receiver.try_iter());

        let bytes: usize = batch.iter().map(|p| p.frame.len()).sum();
        shared.flush.record(batch.len() as u64, bytes as u64);

        let learner = shared
            .learner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        for proposal in batch {
            shared.next_slot.fetch_add(1, Ordering::SeqCst);
            lock(&proposal.stats).commit_time += proposal.proposed_at.elapsed();
            proposal.completion.complete();
            if let Some(learner) = &learner {
                let delivered =
                    panic::catch_unwind(AssertUnwindSafe(|| learner.deliver(&proposal.frame)));
                if let Err(panic) = delivered {
                    let detail = invariant::panic_message(panic.as_ref());
                    invariant::violation("learner_returns", detail);
                }
            }
        }
    }
}

/// Coordinator that hands each envelope to the local scheduler.
pub struct LocalCoordinator {
    id: CoordinatorId,
    config: CoordinatorConfig,
    scheduler: Arc<LocalScheduler>,
    stats: Arc<Mutex<CoordinatorStats>>,
}

impl LocalCoordinator {
    fn log_dropped(&self, detail: &str) {
        let coordinator = self.id.to_string();
        Logger::error(
            Event::ProposalDropped,
            &[("coordinator_id", &coordinator), ("detail", detail)],
        );
    }
}

impl Coordinator for LocalCoordinator {
    fn id(&self) -> CoordinatorId {
        self.id
    }

    fn submit(&self, envelope: CommandEnvelope, completion: Completion) -> ProposalResult<()> {
        let started = Instant::now();
        let frame = match self.config.codec.encode(&envelope) {
            Ok(frame) => frame,
            Err(e) => {
                self.log_dropped(&e.to_string());
                return Err(e.into());
            }
        };

        let proposal = Proposal {
            frame,
            completion,
            stats: Arc::clone(&self.stats),
            proposed_at: started,
        };
        if let Err(proposal) = self.scheduler.propose(proposal) {
            // Dropping the proposal releases the coordinator.
            drop(proposal);
            self.log_dropped("scheduler stopped");
            return Err(ProposalError::Stopped("scheduler stopped".to_string()));
        }

        let mut stats = lock(&self.stats);
        stats.instances += 1;
        stats.submit_time += started.elapsed();
        Ok(())
    }

    fn stats(&self) -> CoordinatorStats {
        *lock(&self.stats)
    }
}

/// Status service of the in-memory log.
///
/// Any request returns a JSON object with the site id, the number of
/// learned commands and the flush averages.
pub struct LogService {
    site_id: SiteId,
    scheduler: Arc<LocalScheduler>,
    flush: Arc<FlushStats>,
}

impl RpcService for LogService {
    fn id(&self) -> ServiceId {
        LOG_SERVICE_ID
    }

    fn name(&self) -> &str {
        "paxos.log"
    }

    fn handle(&self, _request: &[u8]) -> Vec<u8> {
        json!({
            "site_id": self.site_id,
            "learned": self.scheduler.learned(),
            "average_entries_per_flush": self.flush.average_entries_per_flush(),
            "average_bytes_per_flush": self.flush.average_bytes_per_flush(),
        })
        .to_string()
        .into_bytes()
    }

    fn recorder(&self) -> Option<&dyn FlushRecorder> {
        Some(self.flush.as_ref())
    }
}

/// Single-site protocol. One scheduler per protocol instance.
#[derive(Default)]
pub struct LocalProtocol {
    scheduler: Mutex<Option<Arc<LocalScheduler>>>,
}

impl LocalProtocol {
    /// Create a protocol; the scheduler starts on first use.
    pub fn new() -> Self {
        Self::default()
    }

    /// The scheduler, started if needed.
    pub fn local_scheduler(&self) -> Arc<LocalScheduler> {
        Arc::clone(lock(&self.scheduler).get_or_insert_with(LocalScheduler::start))
    }
}

impl ReplicationProtocol for LocalProtocol {
    fn create_scheduler(&self) -> Arc<dyn Scheduler> {
        self.local_scheduler()
    }

    fn create_rpc_services(
        &self,
        site_id: SiteId,
        _scheduler: &Arc<dyn Scheduler>,
    ) -> Vec<Arc<dyn RpcService>> {
        let scheduler = self.local_scheduler();
        let flush = scheduler.flush_stats();
        vec![Arc::new(LogService {
            site_id,
            scheduler,
            flush,
        })]
    }

    fn create_communication_channel(&self) -> Option<Arc<dyn CommunicationChannel>> {
        Some(Arc::new(LocalChannel::default()))
    }

    fn create_coordinator(
        &self,
        id: CoordinatorId,
        config: &CoordinatorConfig,
    ) -> Arc<dyn Coordinator> {
        Arc::new(LocalCoordinator {
            id,
            config: *config,
            scheduler: self.local_scheduler(),
            stats: Arc::new(Mutex::new(CoordinatorStats::default())),
        })
    }
}
