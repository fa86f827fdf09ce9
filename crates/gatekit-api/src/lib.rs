//! # gatekit-api: Axum Service Layer
//!
//! Exposes storage-backed resources as HTTP endpoints behind a chain of
//! request gates.
//!
//! ## Request Path
//!
//! TraceLayer → CorsLayer → metrics → route → gate pipeline → entity
//!
//! The gate pipeline of a dispatcher endpoint is `TraceStage` followed by
//! `AuthenticationGate`, then any stages registered for that endpoint
//! (`RoleGate`, `AmbientRoleGate`, or custom [`Stage`]s).
//!
//! ## Built-in Routes
//!
//! - `/healthz`, `/readyz`: probes (public)
//! - `/metrics`: Prometheus text format (public)
//! - anything else unmatched: 404 `{"message": "Page not found"}`
//!
//! ## Usage
//!
//! ```ignore
//! let app = Application::from_env()?;
//! let widgets = app.resource("/widgets", Widgets::default()).crud();
//! let server = app.mount(widgets).into_server();
//! server.start(addr).await?;
//! ```

pub mod app;
pub mod config;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod extractors;
pub mod gates;
pub mod health;
pub mod middleware;
pub mod pipeline;
pub mod server;

pub use app::{Application, InitError};
pub use config::AppConfig;
pub use dispatcher::ResourceRoutes;
pub use error::AppError;
pub use health::{HealthProbe, Readiness};
pub use pipeline::{Flow, GateRequest, Pipeline, Stage};
pub use server::{Registrar, Server, ServerError};
