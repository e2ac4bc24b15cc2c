//! Network-facing servers launched by the kernel.
//!
//! # Data Flow
//! ```text
//! Launcher → net::bind → registry.register(name) → spawn axum::serve
//!
//! Shutdown:
//!     registry.close(name) → listener released → graceful drain → task joined
//! ```
//!
//! # Design Decisions
//! - One `ServerProcess` type serves every router
//! - The listener close request doubles as axum's graceful shutdown signal
//! - Request timeouts and tracing come from tower-http layers

pub mod debug;
pub mod info;
pub mod metrics;
pub mod query;
pub mod service;
pub mod web3;

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::lifecycle::process::DeadlineExceeded;
use crate::lifecycle::{BoxError, Process, ShutdownContext};
use crate::net::{self, ListenerHandle, ListenerRegistry, ManagedListener};

/// Per-request timeout applied to every server.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// An axum server running on a managed listener.
pub struct ServerProcess {
    name: String,
    local_addr: SocketAddr,
    handle: ListenerHandle,
    task: Option<JoinHandle<std::io::Result<()>>>,
}

impl ServerProcess {
    /// Start serving `router` on `listener` in a background task.
    #[allow(deprecated)]
    pub fn serve(name: impl Into<String>, listener: ManagedListener, handle: ListenerHandle, router: Router) -> Self {
        let name = name.into();
        let local_addr = listener.local_addr();
        let app = router.layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT)),
        );
        let signal = listener.close_signal();

        let task_name = name.clone();
        let task = tokio::spawn(async move {
            tracing::info!(server = %task_name, address = %local_addr, "Server starting");
            let result = axum::serve(listener, app).with_graceful_shutdown(signal).await;
            tracing::info!(server = %task_name, "Server stopped");
            result
        });

        Self {
            name,
            local_addr,
            handle,
            task: Some(task),
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[async_trait]
impl Process for ServerProcess {
    async fn shutdown(&mut self, ctx: ShutdownContext) -> Result<(), BoxError> {
        let Some(mut task) = self.task.take() else {
            return Ok(());
        };

        if tokio::time::timeout_at(ctx.deadline(), self.handle.close()).await.is_err() {
            task.abort();
            return Err(Box::new(DeadlineExceeded(self.name.clone())));
        }

        match tokio::time::timeout_at(ctx.deadline(), &mut task).await {
            Ok(Ok(result)) => result.map_err(Into::into),
            Ok(Err(join_err)) => Err(Box::new(join_err)),
            Err(_) => {
                task.abort();
                Err(Box::new(DeadlineExceeded(self.name.clone())))
            }
        }
    }
}

/// Bind `address`, register the listener under `name`, and serve `router`.
pub async fn launch_server(
    name: &str,
    address: &str,
    registry: &ListenerRegistry,
    router: Router,
) -> Result<ServerProcess, BoxError> {
    let (listener, handle) = net::bind(address).await?;
    registry.register(name, handle.clone())?;
    Ok(ServerProcess::serve(name, listener, handle, router))
}

/// JSON error body used by every server.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}
