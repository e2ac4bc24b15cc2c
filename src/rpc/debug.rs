//! Debug server: runtime variables and an administrative shutdown endpoint.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::lifecycle::Shutdown;
use crate::net::ListenerRegistry;

#[derive(Clone)]
pub struct DebugState {
    pub started: Instant,
    pub shutdown: Shutdown,
    pub listeners: Arc<ListenerRegistry>,
}

#[derive(Debug, Serialize)]
pub struct RuntimeVars {
    pub pid: u32,
    pub uptime_secs: u64,
    pub version: &'static str,
    pub worker_threads: usize,
    pub listeners: Vec<String>,
    pub shutdown_requested: bool,
}

pub fn router(state: DebugState) -> Router {
    Router::new()
        .route("/debug/vars", get(vars))
        .route("/debug/shutdown", post(request_shutdown))
        .with_state(state)
}

async fn vars(State(state): State<DebugState>) -> Json<RuntimeVars> {
    let runtime = tokio::runtime::Handle::current().metrics();
    Json(RuntimeVars {
        pid: std::process::id(),
        uptime_secs: state.started.elapsed().as_secs(),
        version: env!("CARGO_PKG_VERSION"),
        worker_threads: runtime.num_workers(),
        listeners: state.listeners.names(),
        shutdown_requested: state.shutdown.is_triggered(),
    })
}

async fn request_shutdown(State(state): State<DebugState>) -> (StatusCode, Json<serde_json::Value>) {
    tracing::warn!("Shutdown requested through the debug server");
    state.shutdown.trigger();
    (StatusCode::ACCEPTED, Json(serde_json::json!({ "status": "shutting down" })))
}
