//! # gatekit-demo: Binary Entry Point
//!
//! Serves two resources over in-memory storage:
//!
//! - `/widgets` (delete requires the `admin` role on the caller's account)
//! - `/widgets/:widget_id/parts` (delete requires the `admin` role from the
//!   role service, via `Authorization: Bearer`)
//!
//! Configuration comes from the environment; see `AppConfig::from_env`.

mod widgets;

use gatekit_api::gates::AmbientRoleGate;
use gatekit_api::Application;
use tracing_subscriber::EnvFilter;

use widgets::{Parts, StoreProbe, Widgets, WIDGET_ID_PARAM};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => builder.json().init(),
        _ => builder.init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let app = Application::from_env().map_err(|e| {
        tracing::error!("startup failed: {e}");
        e
    })?;
    let addr = app.http_addr();

    let widgets = Widgets::default();
    let parts = Parts::new(widgets.store().clone());
    let widget_probe = StoreProbe::new("widgets", widgets.store().clone());
    let part_probe = StoreProbe::new("parts", parts.store().clone());

    let widget_routes = app
        .resource("/widgets", widgets)
        .id_param(WIDGET_ID_PARAM)
        .list()
        .get()
        .create()
        .update()
        .stage(AmbientRoleGate::admin())
        .delete();

    let parts_admin = app.role_gate("admin");
    let part_routes = app
        .resource(format!("/widgets/:{WIDGET_ID_PARAM}/parts"), parts)
        .list()
        .get()
        .create()
        .update()
        .stage(parts_admin)
        .delete();

    let server = app
        .mount(widget_routes)
        .mount(part_routes)
        .health_probe(widget_probe)
        .health_probe(part_probe)
        .into_server();

    server.start(addr).await?;
    tokio::signal::ctrl_c().await?;
    server.stop().await?;
    Ok(())
}
