//! # Server Lifecycle
//!
//! [`Server`] owns everything that lives as long as the process serves
//! traffic: the router, the metrics registry, the readiness flag, and the
//! handle of the serving task. Nothing is global; two servers in one
//! process are independent.
//!
//! An optional [`Registrar`] announces the bound address to a discovery
//! backend after the listener is up and withdraws it before shutdown.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::health::Readiness;
use crate::middleware::metrics::ApiMetrics;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("server is already running on {0}")]
    AlreadyRunning(SocketAddr),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("server task failed: {0}")]
    Serve(#[from] io::Error),

    #[error("server task panicked or was aborted: {0}")]
    Join(String),

    #[error("service registration failed: {0}")]
    Registration(String),
}

/// Service-discovery hook called from [`Server::start`] and [`Server::stop`].
#[async_trait::async_trait]
pub trait Registrar: Send + Sync + 'static {
    /// Announce `addr`. An error aborts the start.
    async fn register(&self, addr: SocketAddr) -> Result<(), String>;

    /// Withdraw `addr`. Errors are logged; the stop goes on.
    async fn deregister(&self, addr: SocketAddr) -> Result<(), String>;
}

struct Running {
    addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<io::Result<()>>,
}

pub struct Server {
    router: Router,
    readiness: Readiness,
    metrics: ApiMetrics,
    registrar: Option<Arc<dyn Registrar>>,
    running: Mutex<Option<Running>>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("ready", &self.readiness.is_ready())
            .field("local_addr", &self.local_addr())
            .field("registrar", &self.registrar.is_some())
            .finish_non_exhaustive()
    }
}

impl Server {
    pub fn new(router: Router, readiness: Readiness, metrics: ApiMetrics) -> Self {
        Self {
            router,
            readiness,
            metrics,
            registrar: None,
            running: Mutex::new(None),
        }
    }

    /// Register with a discovery backend on every start.
    pub fn with_registrar(mut self, registrar: impl Registrar) -> Self {
        self.registrar = Some(Arc::new(registrar));
        self
    }

    /// Bind `addr`, start serving in the background, register, and mark the
    /// service ready. Returns the bound address (useful with port 0).
    ///
    /// A failed registration shuts the listener down again.
    pub async fn start(&self, addr: SocketAddr) -> Result<SocketAddr, ServerError> {
        if let Some(addr) = self.local_addr() {
            return Err(ServerError::AlreadyRunning(addr));
        }

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let bound = listener.local_addr()?;

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        let app = self
            .router
            .clone()
            .into_make_service_with_connect_info::<SocketAddr>();

        {
            let mut running = self.running.lock();
            if let Some(current) = running.as_ref() {
                return Err(ServerError::AlreadyRunning(current.addr));
            }
            let task = tokio::spawn(async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move { signal.cancelled().await })
                    .await
            });
            *running = Some(Running {
                addr: bound,
                shutdown,
                task,
            });
        }

        if let Some(registrar) = &self.registrar {
            if let Err(reason) = registrar.register(bound).await {
                tracing::error!(addr = %bound, %reason, "service registration failed");
                let running = self.running.lock().take();
                if let Some(running) = running {
                    running.shutdown.cancel();
                    let _ = running.task.await;
                }
                return Err(ServerError::Registration(reason));
            }
        }

        self.readiness.set(true);
        tracing::info!(addr = %bound, "gatekit listening");
        Ok(bound)
    }

    /// Mark the service not ready, stop accepting connections, and wait for
    /// in-flight requests. Stopping a stopped server is a no-op.
    pub async fn stop(&self) -> Result<(), ServerError> {
        self.readiness.set(false);
        let Some(running) = self.running.lock().take() else {
            return Ok(());
        };

        tracing::info!(addr = %running.addr, "gatekit shutting down");
        if let Some(registrar) = &self.registrar {
            if let Err(reason) = registrar.deregister(running.addr).await {
                tracing::warn!(addr = %running.addr, %reason, "service deregistration failed");
            }
        }
        running.shutdown.cancel();
        match running.task.await {
            Ok(result) => result.map_err(ServerError::from),
            Err(e) => Err(ServerError::Join(e.to_string())),
        }
    }

    /// The bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().as_ref().map(|r| r.addr)
    }

    pub fn is_ready(&self) -> bool {
        self.readiness.is_ready()
    }

    pub fn metrics(&self) -> &ApiMetrics {
        &self.metrics
    }

    /// The served router, for driving requests without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.shutdown.cancel();
        }
    }
}
