//! Worker Lifecycle Tests
//!
//! - Setup steps run in order and cannot be skipped
//! - A port already in use is a fatal bind failure
//! - The control server listens on port + 10000 when the heartbeat is on
//! - Shutdown releases servers and ends in Stopped

mod common;

use std::io::Write;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use common::{free_port_pair, http, leader_config};
use paxgate::config::NodeConfig;
use paxgate::protocol::local::{LocalProtocol, LOG_SERVICE_ID};
use paxgate::rpc;
use paxgate::worker::{HostErrorKind, ReplicationWorker, WorkerState};

fn worker(config: NodeConfig) -> ReplicationWorker {
    ReplicationWorker::new(config, Arc::new(LocalProtocol::new()))
}

// =============================================================================
// Ordering
// =============================================================================

#[test]
fn test_setup_steps_in_order() {
    let mut worker = worker(leader_config());
    assert_eq!(worker.state(), WorkerState::Unconfigured);

    worker.setup_base().unwrap();
    assert_eq!(worker.state(), WorkerState::BaseReady);
    assert!(worker.pool_stats().is_some());

    worker.setup_commo().unwrap();
    assert_eq!(worker.state(), WorkerState::CommoReady);
    assert!(worker.has_channel());

    worker.setup_service().unwrap();
    assert_eq!(worker.state(), WorkerState::ServiceReady);
    assert!(worker.rpc_addr().is_some());

    // Heartbeat disabled: no state change, no control server
    worker.setup_heartbeat().unwrap();
    assert_eq!(worker.state(), WorkerState::ServiceReady);
    assert!(worker.control_addr().is_none());

    worker.start().unwrap();
    assert_eq!(worker.state(), WorkerState::Running);

    worker.shutdown().unwrap();
    assert_eq!(worker.state(), WorkerState::Stopped);
    assert!(worker.rpc_addr().is_none());
    assert!(worker.pool_stats().is_none());
}

#[test]
fn test_out_of_order_steps_are_rejected() {
    let mut worker = worker(leader_config());
    assert_eq!(
        worker.setup_service().unwrap_err().kind,
        HostErrorKind::IllegalTransition
    );
    assert_eq!(worker.start().unwrap_err().kind, HostErrorKind::IllegalTransition);

    worker.setup_base().unwrap();
    assert_eq!(
        worker.setup_base().unwrap_err().kind,
        HostErrorKind::IllegalTransition
    );
    assert_eq!(worker.state(), WorkerState::BaseReady);
}

// =============================================================================
// Bind failure
// =============================================================================

#[test]
fn test_port_in_use_is_fatal_bind_failure() {
    let occupied = TcpListener::bind("127.0.0.1:0").unwrap();
    let mut config = leader_config();
    config.site.port = occupied.local_addr().unwrap().port();

    let mut worker = worker(config);
    worker.setup_base().unwrap();
    worker.setup_commo().unwrap();
    let err = worker.setup_service().unwrap_err();

    assert_eq!(err.kind, HostErrorKind::BindFailure);
    assert!(err.is_fatal());
    assert_eq!(worker.state(), WorkerState::CommoReady);

    // A failed boot still tears down cleanly
    worker.shutdown().unwrap();
    assert_eq!(worker.state(), WorkerState::Stopped);
}

// =============================================================================
// Services
// =============================================================================

/// The protocol's log service answers over the RPC server.
#[test]
fn test_log_service_over_rpc() {
    let mut worker = worker(leader_config());
    worker.setup().unwrap();
    worker.start().unwrap();
    for _ in 0..3 {
        worker.submit_example().unwrap();
    }
    worker.drain();

    let address = worker.rpc_addr().unwrap();
    let body = rpc::call(address, LOG_SERVICE_ID, b"").unwrap();
    let status: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(status["site_id"], 0);
    assert_eq!(status["learned"], 3);

    worker.shutdown().unwrap();
}

// =============================================================================
// Heartbeat
// =============================================================================

#[test]
fn test_heartbeat_on_control_port() {
    let port = free_port_pair();
    let mut config = leader_config();
    config.site.port = port;
    config.heartbeat.enabled = true;

    let mut worker = worker(config);
    worker.setup().unwrap();
    assert_eq!(worker.state(), WorkerState::HeartbeatReady);

    let control = worker.control_addr().unwrap();
    assert_eq!(control.port(), port + 10000);
    assert_eq!(worker.rpc_addr().unwrap().port(), port);

    let ready = http(control, "GET", "/ready");
    assert!(ready.starts_with("HTTP/1.1 200"), "{}", ready);

    worker.start().unwrap();
    assert!(!worker.block_until_shutdown_requested(Some(Duration::from_millis(10))));

    let accepted = http(control, "POST", "/shutdown");
    assert!(accepted.starts_with("HTTP/1.1 202"), "{}", accepted);
    assert!(worker.block_until_shutdown_requested(Some(Duration::from_secs(5))));

    worker.shutdown().unwrap();
    assert!(worker.control_addr().is_none());
    assert!(!worker.control().is_ready());
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn test_worker_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "site": {{"name": "site-7", "id": 7, "host": "127.0.0.1", "port": 0}},
            "frame_policy": "nul_terminated",
            "max_coordinators": 4
        }}"#
    )
    .unwrap();

    let config = NodeConfig::load(file.path()).unwrap();
    let mut worker = worker(config);
    worker.setup().unwrap();
    worker.start().unwrap();

    let (tx, rx) = std::sync::mpsc::channel();
    let tx = std::sync::Mutex::new(tx);
    worker.register_apply_callback(move |payload| tx.lock().unwrap().send(payload.to_vec()).unwrap());
    worker.submit_example().unwrap();
    worker.drain();

    assert_eq!(rx.recv().unwrap(), b"abc".to_vec());
    assert_eq!(worker.config().site.name, "site-7");
    worker.shutdown().unwrap();
}
