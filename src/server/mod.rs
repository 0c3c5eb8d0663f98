//! HTTP and WebSocket surface of the dashboard
//!
//! REST endpoints start, stop and list runs and serve result artifacts;
//! `/ws` streams every published run event to connected browsers.

pub mod error;
pub mod files;
pub mod handlers;
pub mod ws;

pub use error::{ApiError, ApiResponse};

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::execution::{BroadcastPublisher, Orchestrator};

/// Shared handler state
pub struct ServerState {
    pub orchestrator: Arc<Orchestrator>,
    pub events: BroadcastPublisher,
    /// Flipped once shutdown begins so open sockets close.
    closing: watch::Sender<bool>,
}

pub struct DashboardServer {
    state: Arc<ServerState>,
}

impl DashboardServer {
    /// `events` must be the publisher `orchestrator` publishes to.
    pub fn new(orchestrator: Arc<Orchestrator>, events: BroadcastPublisher) -> Self {
        let (closing, _) = watch::channel(false);
        Self {
            state: Arc::new(ServerState {
                orchestrator,
                events,
                closing,
            }),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/health", get(handlers::health))
            .route("/api/tests", get(handlers::list_tests))
            .route("/api/tests/run", post(handlers::run_test))
            .route("/api/tests/run-all", post(handlers::run_all))
            .route("/api/tests/stop", post(handlers::stop_test))
            .route("/api/tests/running", get(handlers::running))
            .route("/api/results", get(handlers::list_results))
            .route("/api/results/{file}", get(handlers::get_result))
            .route("/ws", get(ws::websocket_handler))
            .layer(CorsLayer::permissive())
            .with_state(Arc::clone(&self.state))
    }

    /// Bind `host:port` and serve until Ctrl-C.
    pub async fn start(self, host: &str, port: u16) -> Result<()> {
        let addr = format!("{host}:{port}");
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;
        info!("Dashboard available at http://{}", addr);

        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on `listener` until `shutdown` resolves, then stop every run
    /// still registered before closing connections.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.router();
        let state = Arc::clone(&self.state);

        let graceful = async move {
            shutdown.await;
            info!("Shutting down, stopping active runs");
            let stopped = state.orchestrator.shutdown().await;
            if stopped > 0 {
                info!("Stopped {} run(s)", stopped);
            }
            state.closing.send_replace(true);
        };

        axum::serve(listener, router)
            .with_graceful_shutdown(graceful)
            .await
            .context("Server error")?;
        Ok(())
    }
}

/// Resolves on Ctrl-C.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
