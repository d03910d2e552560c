pub mod actions;
pub mod admin_client;
pub mod config;
pub mod distribution;
pub mod editor;
pub mod error;
pub mod events;
pub mod hub;
pub mod models;
pub mod router;
pub mod routes;
pub mod store;

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Json, Router};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::distribution::Distribution;
use crate::events::EventSink;
use crate::hub::ConnectionHub;
use crate::store::SlotStore;

/// How long `serve` waits for open sockets to close after shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct AppState {
    pub hub: ConnectionHub,
    pub distribution: Arc<Distribution>,
    pub slots: Arc<SlotStore>,
    pub events: Arc<dyn EventSink>,
    pub shutdown: Shutdown,
}

impl AppState {
    pub fn new(root: PathBuf, events: Arc<dyn EventSink>) -> Self {
        let distribution = Distribution::new(root.clone());
        let slots = SlotStore::open(&root, distribution.catalogue().clone());
        Self {
            hub: ConnectionHub::new(),
            distribution: Arc::new(distribution),
            slots: Arc::new(slots),
            events,
            shutdown: Shutdown::new(),
        }
    }
}

/// Broadcasts the stop signal to every connection task.
#[derive(Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(routes::admin::broadcast),
    components(schemas(
        models::message::Push,
        routes::admin::BroadcastAck,
        routes::admin::ApiError,
    )),
    tags(
        (name = "Admin", description = "Loopback administration of connected clients")
    )
)]
struct ApiDoc;

pub fn app(state: AppState) -> Router {
    routes::api_router(state)
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .layer(TraceLayer::new_for_http())
}

/// Serves until `signal` resolves, then closes every socket and waits for
/// the connections to drain.
pub async fn serve<F>(listener: TcpListener, state: AppState, signal: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let shutdown = state.shutdown.clone();
    let hub = state.hub.clone();
    let app = app(state);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        signal.await;
        tracing::info!("Shutdown requested, closing connections");
        shutdown.trigger();
    })
    .await?;

    let deadline = tokio::time::Instant::now() + DRAIN_TIMEOUT;
    while !hub.is_empty() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    if !hub.is_empty() {
        tracing::warn!("{} connections still open after drain timeout", hub.len());
    }
    Ok(())
}
