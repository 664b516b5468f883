//! Shared helpers for the integration tests

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use paxgate::command::CommandEnvelope;
use paxgate::config::NodeConfig;
use paxgate::pool::{Completion, CoordinatorConfig, CoordinatorStats};
use paxgate::protocol::local::LocalProtocol;
use paxgate::protocol::{
    CommunicationChannel, Coordinator, CoordinatorId, ProposalResult, ReplicationProtocol,
    Scheduler, SiteId,
};
use paxgate::rpc::RpcService;

/// Leader configuration bound to an ephemeral loopback port.
pub fn leader_config() -> NodeConfig {
    let mut config = NodeConfig::new("site-0", 0, 0);
    config.site.host = "127.0.0.1".to_string();
    config
}

/// A port whose control port (port + 10000) is also free.
pub fn free_port_pair() -> u16 {
    for _ in 0..200 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        if port > u16::MAX - 10000 {
            continue;
        }
        if TcpListener::bind(("0.0.0.0", port + 10000)).is_ok() {
            return port;
        }
    }
    panic!("no free port pair found");
}

/// Send one HTTP/1.1 request and return the raw response.
pub fn http(address: SocketAddr, method: &str, path: &str) -> String {
    let mut stream = TcpStream::connect(("127.0.0.1", address.port())).unwrap();
    write!(
        stream,
        "{} {} HTTP/1.1\r\nHost: localhost\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        method, path
    )
    .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    response
}

/// Holds every submission until [`Gate::open`] is called.
#[derive(Default)]
pub struct Gate {
    open: AtomicBool,
    parked: Mutex<Vec<(Arc<dyn Coordinator>, CommandEnvelope, Completion)>>,
}

impl Gate {
    /// Let parked and future submissions through.
    pub fn open(&self) {
        self.open.store(true, Ordering::SeqCst);
        let parked: Vec<_> = self.parked.lock().unwrap().drain(..).collect();
        for (coordinator, envelope, completion) in parked {
            coordinator.submit(envelope, completion).unwrap();
        }
    }

    /// Submissions currently held.
    pub fn parked(&self) -> usize {
        self.parked.lock().unwrap().len()
    }
}

struct GatedCoordinator {
    inner: Arc<dyn Coordinator>,
    gate: Arc<Gate>,
}

impl Coordinator for GatedCoordinator {
    fn id(&self) -> CoordinatorId {
        self.inner.id()
    }

    fn submit(&self, envelope: CommandEnvelope, completion: Completion) -> ProposalResult<()> {
        let mut parked = self.gate.parked.lock().unwrap();
        if self.gate.open.load(Ordering::SeqCst) {
            drop(parked);
            self.inner.submit(envelope, completion)
        } else {
            parked.push((Arc::clone(&self.inner), envelope, completion));
            Ok(())
        }
    }

    fn stats(&self) -> CoordinatorStats {
        self.inner.stats()
    }
}

/// The in-process protocol with a gate in front of every coordinator.
pub struct GatedProtocol {
    inner: LocalProtocol,
    pub gate: Arc<Gate>,
}

impl GatedProtocol {
    pub fn new() -> Self {
        Self {
            inner: LocalProtocol::new(),
            gate: Arc::new(Gate::default()),
        }
    }
}

impl ReplicationProtocol for GatedProtocol {
    fn create_scheduler(&self) -> Arc<dyn Scheduler> {
        self.inner.create_scheduler()
    }

    fn create_rpc_services(
        &self,
        site_id: SiteId,
        scheduler: &Arc<dyn Scheduler>,
    ) -> Vec<Arc<dyn RpcService>> {
        self.inner.create_rpc_services(site_id, scheduler)
    }

    fn create_communication_channel(&self) -> Option<Arc<dyn CommunicationChannel>> {
        self.inner.create_communication_channel()
    }

    fn create_coordinator(
        &self,
        id: CoordinatorId,
        config: &CoordinatorConfig,
    ) -> Arc<dyn Coordinator> {
        Arc::new(GatedCoordinator {
            inner: self.inner.create_coordinator(id, config),
            gate: Arc::clone(&self.gate),
        })
    }
}
