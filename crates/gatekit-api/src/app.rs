//! # Application Assembly
//!
//! [`Application`] turns an [`AppConfig`] into the remote clients, the
//! base gate pipeline, and the metrics registry, then collects resource
//! registrations and custom routes into one router:
//!
//! ```text
//! TraceLayer -> CorsLayer -> metrics -> route
//!   dispatcher route:  TraceStage -> AuthenticationGate [-> UserLookup] -> [stages] -> entity
//!   /healthz /readyz /metrics
//!   fallback: 404 {"message": "Page not found"}
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::middleware::from_fn_with_state;
use axum::Router;
use gatekit_core::Resource;
use gatekit_remote_client::{RemoteClient, RemoteError};
use thiserror::Error;

use crate::config::{AppConfig, ConfigError};
use crate::dispatcher::ResourceRoutes;
use crate::error::not_found;
use crate::gates::{AuthenticationGate, LocalNetworks, RoleGate, TraceStage, UserLookup, Whitelist};
use crate::health::{self, HealthProbe, Readiness};
use crate::middleware::metrics::{metrics_middleware, ApiMetrics};
use crate::middleware::{cors, tracing_layer};
use crate::pipeline::Pipeline;
use crate::server::Server;

/// Startup failures. All of them are configuration problems.
#[derive(Error, Debug)]
pub enum InitError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("remote client error: {0}")]
    Remote(#[from] RemoteError),

    #[error("invalid public route pattern: {0}")]
    Whitelist(#[from] regex::Error),

    #[error("metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Builder for the service router.
pub struct Application {
    http_addr: SocketAddr,
    remote: RemoteClient,
    pipeline: Pipeline,
    metrics: ApiMetrics,
    readiness: Readiness,
    probes: Vec<Arc<dyn HealthProbe>>,
    routes: Router,
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("http_addr", &self.http_addr)
            .field("pipeline", &self.pipeline)
            .field("probes", &self.probes.iter().map(|p| p.name()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Application {
    /// Read [`AppConfig::from_env`] and build.
    pub fn from_env() -> Result<Self, InitError> {
        Self::from_config(AppConfig::from_env()?)
    }

    pub fn from_config(config: AppConfig) -> Result<Self, InitError> {
        let remote = RemoteClient::new(config.remote)?;
        let whitelist = Whitelist::new(&config.public_routes)?;
        let local = config.local_networks.unwrap_or_else(LocalNetworks::discover);
        let metrics = ApiMetrics::new()?;

        let authentication = AuthenticationGate::new(
            remote.account().cloned(),
            whitelist,
            local,
            config.trust_forwarded_for,
        );
        let pipeline = Pipeline::new()
            .stage(TraceStage)
            .stage(authentication)
            .with_metrics(metrics.clone());

        tracing::info!(
            http_addr = %config.http_addr,
            account_check = remote.account().is_some(),
            role_check = remote.roles().is_some(),
            user_lookup = config.user_lookup,
            "application configured"
        );

        let app = Self {
            http_addr: config.http_addr,
            remote,
            pipeline,
            metrics,
            readiness: Readiness::new(),
            probes: Vec::new(),
            routes: Router::new(),
        };
        Ok(if config.user_lookup {
            app.with_user_lookup()
        } else {
            app
        })
    }

    /// Append [`UserLookup`] to the base pipeline. Resources and protected
    /// routes registered afterwards see the bearer-token owner in
    /// [`RequestContext::user`](gatekit_core::RequestContext::user).
    pub fn with_user_lookup(mut self) -> Self {
        self.pipeline = self
            .pipeline
            .stage(UserLookup::new(self.remote.users().cloned()));
        self
    }

    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    pub fn metrics(&self) -> &ApiMetrics {
        &self.metrics
    }

    /// `TraceStage -> AuthenticationGate`, reporting rejections to this
    /// application's metrics.
    pub fn base_pipeline(&self) -> Pipeline {
        self.pipeline.clone()
    }

    /// A remote role check backed by the configured role service. Denies
    /// everything when `DNS_USERS` is unset.
    pub fn role_gate(&self, role: impl Into<String>) -> RoleGate {
        RoleGate::new(self.remote.roles().cloned(), role)
    }

    /// Start a resource registration on the base pipeline.
    pub fn resource<R: Resource>(&self, prefix: impl Into<String>, resource: R) -> ResourceRoutes<R> {
        ResourceRoutes::new(prefix, resource, self.base_pipeline())
    }

    /// Add the endpoints of a finished registration.
    pub fn mount<R: Resource>(mut self, routes: ResourceRoutes<R>) -> Self {
        self.routes = self.routes.merge(routes.into_router());
        self
    }

    /// Add custom routes behind the base pipeline. Handlers can read the
    /// context with [`Ctx`](crate::extractors::Ctx).
    pub fn protected(mut self, router: Router) -> Self {
        self.routes = self.routes.merge(self.pipeline.protect(router));
        self
    }

    /// Add custom routes with no gates.
    pub fn merge(mut self, router: Router) -> Self {
        self.routes = self.routes.merge(router);
        self
    }

    /// Register a dependency checked by `/healthz`.
    pub fn health_probe(mut self, probe: impl HealthProbe) -> Self {
        self.probes.push(Arc::new(probe));
        self
    }

    /// The complete router. Readiness stays false; use
    /// [`into_server`](Self::into_server) to serve.
    pub fn router(self) -> Router {
        self.into_parts().0
    }

    pub fn into_server(self) -> Server {
        let (router, readiness, metrics) = self.into_parts();
        Server::new(router, readiness, metrics)
    }

    fn into_parts(self) -> (Router, Readiness, ApiMetrics) {
        let router = self
            .routes
            .merge(health::router(
                self.probes,
                self.readiness.clone(),
                self.metrics.clone(),
            ))
            .fallback(not_found)
            .layer(from_fn_with_state(self.metrics.clone(), metrics_middleware))
            .layer(cors::layer())
            .layer(tracing_layer::layer());
        (router, self.readiness, self.metrics)
    }
}
