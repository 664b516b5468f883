//! Control server lifecycle

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::runtime::Runtime;
use tokio::sync::oneshot;

use crate::observability::{Event, Logger};
use crate::rpc::{RpcError, RpcResult, ServerThreads};

use super::routes::control_routes;
use super::service::ControlService;

/// HTTP server for the control endpoint, on its own runtime.
pub struct ControlServer {
    runtime: Option<Runtime>,
    local_addr: Option<SocketAddr>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl ControlServer {
    /// Build the server runtime. Nothing is bound yet.
    pub fn new(threads: ServerThreads) -> RpcResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(threads.io_threads.max(1))
            .max_blocking_threads(threads.worker_threads.max(1))
            .thread_name("paxgate-control")
            .enable_all()
            .build()
            .map_err(RpcError::Runtime)?;

        Ok(Self {
            runtime: Some(runtime),
            local_addr: None,
            shutdown: None,
        })
    }

    /// Bind `address` and serve the control routes for `service`.
    pub fn start(&mut self, address: &str, service: Arc<ControlService>) -> RpcResult<SocketAddr> {
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

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let router = control_routes(service);
        runtime.spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = served {
                let detail = e.to_string();
                Logger::error(Event::RpcConnectionError, &[("detail", &detail)]);
            }
        });

        self.local_addr = Some(bound);
        self.shutdown = Some(shutdown_tx);
        Ok(bound)
    }

    /// Address the server is listening on, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Stop serving and release the runtime.
    pub fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(Duration::from_millis(500));
        }
        self.local_addr = None;
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        self.stop();
    }
}
