//! Replication worker
//!
//! Owns every host-side resource of one site: scheduler, coordinator pool,
//! communication channel, RPC services and servers, learner bridge and
//! submission tracker. Setup and shutdown go through [`WorkerState`];
//! submissions are accepted only while running.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::command::{CommandCodec, CommandEnvelope};
use crate::config::NodeConfig;
use crate::control::{ControlServer, ControlService};
use crate::learner::{ApplyCallback, LearnerBridge};
use crate::observability::{Event, Logger, MetricsRegistry, Severity};
use crate::pool::{CoordinatorPool, PoolError, PoolStats};
use crate::protocol::{
    CommunicationChannel, CoordinatorId, LearnerAction, ProposalError, ReplicationProtocol,
    Scheduler,
};
use crate::rpc::{RpcServer, RpcService};
use crate::tracker::SubmissionTracker;

use super::errors::{HostError, HostResult};
use super::state::WorkerState;

/// Payload submitted by [`ReplicationWorker::submit_example`].
pub const EXAMPLE_COMMAND: &[u8] = b"abc\0";

/// Outcome of an accepted submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    /// Coordinator driving the command's consensus instance
    pub coordinator_id: CoordinatorId,
}

/// Host-side facade over one replication site.
pub struct ReplicationWorker {
    config: NodeConfig,
    protocol: Arc<dyn ReplicationProtocol>,
    codec: CommandCodec,
    state: WorkerState,
    tracker: Arc<SubmissionTracker>,
    metrics: Arc<MetricsRegistry>,
    learner: Arc<LearnerBridge>,
    control: Arc<ControlService>,
    scheduler: Option<Arc<dyn Scheduler>>,
    pool: Option<CoordinatorPool>,
    channel: Option<Arc<dyn CommunicationChannel>>,
    services: Vec<Arc<dyn RpcService>>,
    rpc_server: Option<RpcServer>,
    control_server: Option<ControlServer>,
    flush_logged: bool,
}

impl ReplicationWorker {
    /// Create an unconfigured worker. Nothing is started.
    pub fn new(config: NodeConfig, protocol: Arc<dyn ReplicationProtocol>) -> Self {
        let codec = config.codec();
        let tracker = Arc::new(SubmissionTracker::new());
        let metrics = Arc::new(MetricsRegistry::new());
        let learner = Arc::new(LearnerBridge::new(
            codec,
            Arc::clone(&tracker),
            Arc::clone(&metrics),
        ));
        let control = Arc::new(ControlService::new(
            config.site.name.clone(),
            config.ctrl_timeout(),
            Arc::clone(&metrics),
            Arc::clone(&tracker),
        ));

        Self {
            config,
            protocol,
            codec,
            state: WorkerState::Unconfigured,
            tracker,
            metrics,
            learner,
            control,
            scheduler: None,
            pool: None,
            channel: None,
            services: Vec::new(),
            rpc_server: None,
            control_server: None,
            flush_logged: false,
        }
    }

    /// Create the scheduler and the coordinator pool.
    ///
    /// The learner bridge is registered here so learned commands always end
    /// their submission, whether or not an application callback exists.
    pub fn setup_base(&mut self) -> HostResult<()> {
        let next = self.state.advance(WorkerState::BaseReady)?;

        let scheduler = self.protocol.create_scheduler();
        scheduler.set_locale(self.config.site.locale_id);
        scheduler.register_learner(Arc::clone(&self.learner) as Arc<dyn LearnerAction>);

        self.pool = Some(CoordinatorPool::with_max(
            Arc::clone(&self.protocol),
            self.config.coordinator_config(),
            Arc::clone(&self.metrics),
            self.config.max_coordinators,
        ));
        self.scheduler = Some(scheduler);
        self.state = next;

        let locale = self.config.site.locale_id.to_string();
        let partition = self.config.site.partition_id.to_string();
        Logger::info(
            Event::BaseReady,
            &[
                ("locale_id", &locale),
                ("partition_id", &partition),
                ("site", &self.config.site.name),
            ],
        );
        Ok(())
    }

    /// Create the communication channel and attach it to the scheduler.
    pub fn setup_commo(&mut self) -> HostResult<()> {
        let next = self.state.advance(WorkerState::CommoReady)?;
        let scheduler = self.require_scheduler()?;

        let channel = self.protocol.create_communication_channel();
        if let Some(channel) = &channel {
            channel.set_locale(self.config.site.locale_id);
            scheduler.attach_channel(Arc::clone(channel));
        }
        let attached = channel.is_some().to_string();
        self.channel = channel;
        self.state = next;

        Logger::info(Event::CommoReady, &[("channel", &attached)]);
        Ok(())
    }

    /// Start the RPC server on the site address and register every service.
    pub fn setup_service(&mut self) -> HostResult<()> {
        let next = self.state.advance(WorkerState::ServiceReady)?;
        let scheduler = self.require_scheduler()?;
        let address = self.config.bind_address();

        Logger::info(Event::ServiceStarting, &[("address", &address)]);

        let services = self
            .protocol
            .create_rpc_services(self.config.site.id, &scheduler);
        let mut server = RpcServer::new(
            format!("{}-rpc", self.config.site.name),
            self.config.server_threads(),
        )
        .map_err(|e| self.bind_failed(&address, &e))?;
        for service in &services {
            server.register(Arc::clone(service));
        }
        let bound = server
            .start(&address)
            .map_err(|e| self.bind_failed(&address, &e))?;

        self.services = services;
        self.rpc_server = Some(server);
        self.state = next;

        let bound = bound.to_string();
        let count = self.services.len().to_string();
        Logger::info(
            Event::ServiceReady,
            &[("address", &bound), ("services", &count)],
        );
        Ok(())
    }

    /// Start the control server on `0.0.0.0:(port + 10000)`.
    ///
    /// Does nothing when the heartbeat is disabled.
    pub fn setup_heartbeat(&mut self) -> HostResult<()> {
        if !self.config.heartbeat.enabled {
            return Ok(());
        }
        let next = self.state.advance(WorkerState::HeartbeatReady)?;
        let address = self.config.control_address().ok_or_else(|| {
            HostError::configuration("control port does not fit in a u16")
        })?;

        let mut server = ControlServer::new(self.config.server_threads())
            .map_err(|e| self.bind_failed(&address, &e))?;
        let bound = server
            .start(&address, Arc::clone(&self.control))
            .map_err(|e| self.bind_failed(&address, &e))?;
        self.control.set_ready();
        self.control_server = Some(server);
        self.state = next;

        let bound = bound.to_string();
        Logger::info(Event::HeartbeatReady, &[("address", &bound)]);
        Ok(())
    }

    /// Run every setup step in order.
    pub fn setup(&mut self) -> HostResult<()> {
        self.setup_base()?;
        self.setup_commo()?;
        self.setup_service()?;
        self.setup_heartbeat()
    }

    /// Install the callback invoked with every learned payload.
    pub fn register_apply_callback<F>(&self, callback: F)
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        let callback: ApplyCallback = Arc::new(callback);
        self.learner.set_callback(callback);
    }

    /// Begin accepting submissions.
    pub fn start(&mut self) -> HostResult<()> {
        self.state = self.state.advance(WorkerState::Running)?;
        Logger::info(Event::WorkerRunning, &[("site", &self.config.site.name)]);
        Ok(())
    }

    /// Submit a command for replication.
    ///
    /// Returns as soon as a coordinator has the command; the payload reaches
    /// the apply callback once it is learned. Non-leaders reject with
    /// `NotLeader`, and a fully busy pool rejects with `Backpressure`.
    /// A replication layer that refuses the proposal yields `NotRunning`;
    /// every rejection leaves the in-flight count unchanged.
    pub fn submit(&self, bytes: &[u8]) -> HostResult<Submission> {
        if !self.config.is_leader() {
            self.metrics.increment_rejected_not_leader();
            let locale = self.config.site.locale_id.to_string();
            Logger::warn(Event::SubmitRejectedNotLeader, &[("locale_id", &locale)]);
            return Err(HostError::not_leader(format!(
                "site {} has locale {}",
                self.config.site.name, locale
            )));
        }
        if !self.state.accepts_submissions() {
            return Err(HostError::not_running(format!(
                "worker is {}",
                self.state.state_name()
            )));
        }
        let pool = self
            .pool
            .as_ref()
            .ok_or_else(|| HostError::not_running("coordinator pool not constructed"))?;
        if u32::try_from(bytes.len()).is_err() {
            return Err(HostError::frame(format!(
                "payload of {} bytes exceeds the frame length field",
                bytes.len()
            )));
        }

        let envelope = CommandEnvelope::from_slice(bytes);
        self.tracker.begin();

        let handle = match pool.acquire() {
            Ok(handle) => handle,
            Err(e) => {
                self.tracker.end();
                return Err(match e {
                    PoolError::Exhausted { .. } => {
                        self.metrics.increment_rejected_backpressure();
                        let detail = e.to_string();
                        Logger::warn(Event::SubmitRejectedBackpressure, &[("detail", &detail)]);
                        HostError::backpressure(detail)
                    }
                    PoolError::Closed => HostError::not_running(e.to_string()),
                });
            }
        };

        let coordinator_id = handle.id();
        if let Err(e) = handle.submit(envelope) {
            self.tracker.end();
            return Err(match e {
                ProposalError::Stopped(_) => HostError::not_running(e.to_string()),
                ProposalError::Frame(_) => HostError::frame(e.to_string()),
            });
        }
        self.metrics.increment_accepted();

        if Logger::enabled(Severity::Trace) {
            let id = coordinator_id.to_string();
            let bytes = bytes.len().to_string();
            Logger::trace(
                Event::SubmitAccepted,
                &[("bytes", &bytes), ("coordinator_id", &id)],
            );
        }
        Ok(Submission { coordinator_id })
    }

    /// Submit the four-byte example command `"abc\0"`.
    pub fn submit_example(&self) -> HostResult<Submission> {
        self.submit(EXAMPLE_COMMAND)
    }

    /// Block until every accepted submission has been learned.
    pub fn drain(&self) {
        self.tracker.drain();
    }

    /// Ask the worker to shut down. Wakes
    /// [`block_until_shutdown_requested`](Self::block_until_shutdown_requested).
    pub fn request_shutdown(&self) {
        self.control.request_shutdown();
    }

    /// Whether shutdown was requested.
    pub fn shutdown_requested(&self) -> bool {
        self.control.shutdown_requested()
    }

    /// Block until shutdown is requested, locally or through the control
    /// endpoint. With a timeout, returns `false` if it elapsed first.
    pub fn block_until_shutdown_requested(&self, timeout: Option<Duration>) -> bool {
        self.control.wait_for_shutdown_request(timeout)
    }

    /// Stop the heartbeat server and log the flush averages of every
    /// service that records them.
    pub fn wait_for_shutdown(&mut self) {
        if let Some(mut server) = self.control_server.take() {
            self.control.server_shutdown();
            server.stop();
            Logger::info(Event::HeartbeatStopped, &[("site", &self.config.site.name)]);
        }

        if self.flush_logged {
            return;
        }
        self.flush_logged = true;
        for service in &self.services {
            if let Some(recorder) = service.recorder() {
                let entries = recorder.average_entries_per_flush().to_string();
                let bytes = recorder.average_bytes_per_flush().to_string();
                Logger::info(
                    Event::FlushStats,
                    &[
                        ("avg_bytes_per_flush", &bytes),
                        ("avg_entries_per_flush", &entries),
                        ("service", service.name()),
                    ],
                );
            }
        }
    }

    /// Drain, then release every resource in reverse order of setup.
    ///
    /// Blocks until every accepted submission has been learned. Calling it
    /// again after the worker stopped is a no-op.
    pub fn shutdown(&mut self) -> HostResult<()> {
        if self.state.is_stopped() {
            return Ok(());
        }
        self.state = self.state.advance(WorkerState::ShuttingDown)?;
        let in_flight = self.tracker.in_flight().to_string();
        Logger::info(Event::ShutdownStart, &[("in_flight", &in_flight)]);

        self.tracker.drain();
        self.wait_for_shutdown();

        let count = self.services.len().to_string();
        Logger::info(Event::ServicesStopping, &[("services", &count)]);
        if let Some(mut server) = self.rpc_server.take() {
            server.stop();
        }
        self.services.clear();

        if let Some(pool) = self.pool.take() {
            let totals = pool.drain_all().to_string();
            Logger::info(Event::CoordinatorTotals, &[("totals", &totals)]);
        }
        self.channel = None;
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.stop();
        }

        self.state = self.state.advance(WorkerState::Stopped)?;
        Logger::info(Event::ShutdownComplete, &[("site", &self.config.site.name)]);
        Ok(())
    }

    /// Configuration the worker was created with.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Codec for the configured frame policy.
    pub fn codec(&self) -> CommandCodec {
        self.codec
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Address the RPC server listens on, once started.
    pub fn rpc_addr(&self) -> Option<SocketAddr> {
        self.rpc_server.as_ref().and_then(RpcServer::local_addr)
    }

    /// Address the control server listens on, once started.
    pub fn control_addr(&self) -> Option<SocketAddr> {
        self.control_server.as_ref().and_then(ControlServer::local_addr)
    }

    /// Occupancy of the coordinator pool, once constructed.
    pub fn pool_stats(&self) -> Option<PoolStats> {
        self.pool.as_ref().map(CoordinatorPool::stats)
    }

    /// Whether a communication channel is attached.
    pub fn has_channel(&self) -> bool {
        self.channel.is_some()
    }

    /// Worker counters.
    pub fn metrics(&self) -> Arc<MetricsRegistry> {
        Arc::clone(&self.metrics)
    }

    /// Submission tracker.
    pub fn tracker(&self) -> Arc<SubmissionTracker> {
        Arc::clone(&self.tracker)
    }

    /// Control service shared with the control server.
    pub fn control(&self) -> Arc<ControlService> {
        Arc::clone(&self.control)
    }

    fn require_scheduler(&self) -> HostResult<Arc<dyn Scheduler>> {
        self.scheduler
            .clone()
            .ok_or_else(|| HostError::illegal_transition("scheduler not constructed"))
    }

    fn bind_failed(&self, address: &str, error: &dyn std::fmt::Display) -> HostError {
        let detail = error.to_string();
        Logger::error(
            Event::BindFailed,
            &[("address", address), ("detail", &detail)],
        );
        HostError::bind_failure(format!("{}: {}", address, detail))
    }
}
