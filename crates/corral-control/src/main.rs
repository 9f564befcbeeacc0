//! corrald - cluster node lifecycle service
//!
//! Opens the node store, registers the resource adapters and serves health
//! endpoints. Node state change events are logged as they are published.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use corral_adapter::{AdapterRegistry, BareMetalAdapter, BareMetalConfig};
use corral_control::{BroadcastEventSink, ControlConfig, Orchestrator};
use corral_store::{RocksStore, Store};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
struct AppState<S: Store> {
    orchestrator: Arc<Orchestrator<S>>,
}

impl<S: Store> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            orchestrator: Arc::clone(&self.orchestrator),
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        service: "corrald",
    })
}

async fn ready_handler<S: Store + 'static>(State(state): State<AppState<S>>) -> impl IntoResponse {
    if state.orchestrator.registry().is_empty() {
        return (StatusCode::SERVICE_UNAVAILABLE, "no resource adapters");
    }
    match state.orchestrator.store().list_hardware_profiles() {
        Ok(_) => (StatusCode::OK, "ready"),
        Err(e) => {
            tracing::warn!(error = %e, "store not ready");
            (StatusCode::SERVICE_UNAVAILABLE, "store unavailable")
        }
    }
}

fn create_router<S: Store + 'static>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler::<S>))
        .with_state(state)
}

fn spawn_event_logger(events: &BroadcastEventSink) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => tracing::info!(
                    node = event.node_name().unwrap_or_default(),
                    previous_state = %event.previous_state,
                    state = event.state().unwrap_or_default(),
                    "node state changed"
                ),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event logger lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,corral=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting corrald");

    let config = ControlConfig::from_env();
    let bare_metal = BareMetalConfig::from_env();

    let store = Arc::new(RocksStore::open(&config.data_dir)?);
    tracing::info!(data_dir = %config.data_dir.display(), "Initialized RocksDB store");

    let registry = Arc::new(AdapterRegistry::new());
    registry.register(Arc::new(BareMetalAdapter::new(bare_metal)));
    tracing::info!(adapters = ?registry.names(), "Registered resource adapters");

    let events = BroadcastEventSink::new(config.event_channel_capacity);
    spawn_event_logger(&events);

    let orchestrator = Arc::new(Orchestrator::new(store, registry, Arc::new(events)));
    let app = create_router(AppState { orchestrator });

    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
