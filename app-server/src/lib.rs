//! HTTP front door for the replay engine.
//!
//! `GET /ws` upgrades to a WebSocket carrying one observer connection;
//! `GET /api/health` is a liveness probe.

mod connection;

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::extract::WebSocketUpgrade;
use axum::response::IntoResponse;
use axum::routing::get;
use logreplay_core::ReplayConfig;
use logreplay_core::ReplayOrchestrator;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Clone)]
struct AppState {
    orchestrator: ReplayOrchestrator,
}

pub fn router(config: Arc<ReplayConfig>) -> Router {
    let state = AppState {
        orchestrator: ReplayOrchestrator::new(config),
    };
    Router::new()
        .route("/ws", get(ws_upgrade))
        .route("/api/health", get(health))
        .with_state(state)
}

/// Serve until the listener fails or `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, config: Arc<ReplayConfig>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(
        addr = %listener.local_addr()?,
        mode = config.mode.label(),
        "listening"
    );
    axum::serve(listener, router(config))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_socket(socket, state.orchestrator))
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
