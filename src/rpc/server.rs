//! Length-framed TCP RPC server

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tokio::sync::oneshot;

use crate::observability::{Event, Logger};

use super::errors::{RpcError, RpcResult};
use super::wire::{read_request, write_response, ResponseStatus};
use super::{RpcService, ServiceId};

type ServiceMap = Arc<RwLock<HashMap<ServiceId, Arc<dyn RpcService>>>>;

/// Thread budget of one server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerThreads {
    /// Threads polling sockets
    pub io_threads: usize,
    /// Threads running service handlers
    pub worker_threads: usize,
}

impl Default for ServerThreads {
    fn default() -> Self {
        Self {
            io_threads: 1,
            worker_threads: 1,
        }
    }
}

/// RPC server hosting registered services.
///
/// Lifecycle: `new` → `register`* → `start` → `stop`. Dropping the server
/// stops it.
pub struct RpcServer {
    name: String,
    runtime: Option<Runtime>,
    services: ServiceMap,
    local_addr: Option<SocketAddr>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl RpcServer {
    /// Build a server and its runtime. Nothing is bound yet.
    pub fn new(name: impl Into<String>, threads: ServerThreads) -> RpcResult<Self> {
        let name = name.into();
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(threads.io_threads.max(1))
            .max_blocking_threads(threads.worker_threads.max(1))
            .thread_name(format!("{}-io", name))
            .enable_all()
            .build()
            .map_err(RpcError::Runtime)?;

        Ok(Self {
            name,
            runtime: Some(runtime),
            services: Arc::new(RwLock::new(HashMap::new())),
            local_addr: None,
            shutdown: None,
        })
    }

    /// Register a service. A later registration under the same id replaces
    /// the earlier one.
    pub fn register(&self, service: Arc<dyn RpcService>) {
        let mut services = self
            .services
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        services.insert(service.id(), service);
    }

    /// Number of registered services.
    pub fn service_count(&self) -> usize {
        self.services
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Bind `address` and start accepting connections.
    ///
    /// Returns the bound address (useful when binding port 0).
    pub fn start(&mut self, address: &str) -> RpcResult<SocketAddr> {
        if let Some(bound) = self.local_addr {
            return Err(RpcError::AlreadyStarted(bound));
        }
        let runtime = self.runtime.as_ref().ok_or_else(|| {
            RpcError::Runtime(io::Error::new(io::ErrorKind::Other, "server stopped"))
        })?;

        let listener = runtime
            .block_on(TcpListener::bind(address))
            .map_err(|source| RpcError::Bind {
                address: address.to_string(),
                source,
            })?;
        let bound = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        runtime.spawn(accept_loop(listener, Arc::clone(&self.services), shutdown_rx));

        self.local_addr = Some(bound);
        self.shutdown = Some(shutdown_tx);
        Ok(bound)
    }

    /// Address the server is listening on, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Server name, as used for thread names.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop accepting, drop registered services and release the runtime.
    pub fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(Duration::from_millis(500));
        }
        self.services
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
        self.local_addr = None;
    }
}

impl Drop for RpcServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn accept_loop(
    listener: TcpListener,
    services: ServiceMap,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tokio::spawn(serve_connection(stream, peer, Arc::clone(&services)));
                }
                Err(e) => {
                    let detail = e.to_string();
                    Logger::error(Event::RpcConnectionError, &[("detail", &detail)]);
                }
            },
        }
    }
}

async fn serve_connection(mut stream: TcpStream, peer: SocketAddr, services: ServiceMap) {
    if let Err(e) = serve_requests(&mut stream, &services).await {
        let peer = peer.to_string();
        let detail = e.to_string();
        Logger::warn(
            Event::RpcConnectionError,
            &[("peer", &peer), ("detail", &detail)],
        );
    }
}

async fn serve_requests(stream: &mut TcpStream, services: &ServiceMap) -> RpcResult<()> {
    while let Some((service_id, body)) = read_request(stream).await? {
        let service = services
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&service_id)
            .cloned();

        match service {
            Some(service) => {
                let response = tokio::task::spawn_blocking(move || service.handle(&body))
                    .await
                    .map_err(|e| RpcError::Malformed(format!("handler failed: {}", e)))?;
                write_response(stream, ResponseStatus::Ok, &response).await?;
            }
            None => write_response(stream, ResponseStatus::UnknownService, &[]).await?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::call;

    struct Echo;

    impl RpcService for Echo {
        fn id(&self) -> ServiceId {
            1
        }

        fn name(&self) -> &str {
            "echo"
        }

        fn handle(&self, request: &[u8]) -> Vec<u8> {
            request.iter().rev().copied().collect()
        }
    }

    #[test]
    fn test_serves_registered_service() {
        let mut server = RpcServer::new("test-rpc", ServerThreads::default()).unwrap();
        server.register(Arc::new(Echo));
        let address = server.start("127.0.0.1:0").unwrap();

        assert_eq!(call(address, 1, b"abc").unwrap(), b"cba");
        assert_eq!(server.service_count(), 1);
        server.stop();
        assert!(server.local_addr().is_none());
    }

    #[test]
    fn test_unknown_service_status() {
        let mut server = RpcServer::new("test-rpc", ServerThreads::default()).unwrap();
        let address = server.start("127.0.0.1:0").unwrap();

        match call(address, 42, b"") {
            Err(RpcError::Status { service, status }) => {
                assert_eq!(service, 42);
                assert_eq!(status, ResponseStatus::UnknownService as u8);
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[test]
    fn test_bind_failure_is_reported() {
        let mut first = RpcServer::new("first", ServerThreads::default()).unwrap();
        let address = first.start("127.0.0.1:0").unwrap();

        let mut second = RpcServer::new("second", ServerThreads::default()).unwrap();
        let err = second.start(&address.to_string()).unwrap_err();
        assert!(err.is_bind_failure());
    }

    #[test]
    fn test_start_twice_rejected() {
        let mut server = RpcServer::new("test-rpc", ServerThreads::default()).unwrap();
        server.start("127.0.0.1:0").unwrap();
        assert!(matches!(
            server.start("127.0.0.1:0"),
            Err(RpcError::AlreadyStarted(_))
        ));
    }
}
