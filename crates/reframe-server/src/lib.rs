//! HTTP transform service for Reframe.
//!
//! This crate provides the network layer of the service:
//!
//! - [`Server`]: one transform worker. Owns a session store, the
//!   per-session serializer and the codec pool, and serves the
//!   `/transform/*` and `/health` endpoints.
//! - [`Supervisor`]: spawns worker processes and restarts them when they
//!   exit.
//! - [`FrontRouter`]: accepts client connections and forwards each request
//!   to the worker that owns its session, or round-robin for new uploads.
//!
//! # Example
//!
//! ```ignore
//! use reframe_server::{Server, ServerConfig};
//!
//! let config = ServerConfig::new()
//!     .with_bind_address("127.0.0.1:8080".parse()?);
//!
//! Server::new(config).run().await?;
//! ```

pub mod codec_pool;
pub mod config;
pub mod error;
pub mod middleware;
pub mod router;
pub mod routes;
pub mod serializer;
pub mod state;
pub mod supervisor;

pub use codec_pool::CodecPool;
pub use config::ServerConfig;
pub use error::{ErrorResponse, Result, ServerError};
pub use router::{FrontRouter, RouterConfig, RouterHealth, WorkerHealth};
pub use routes::{HealthResponse, SessionInfo, TransformResponse};
pub use serializer::SessionSerializer;
pub use state::{AppState, EvictionLog};
pub use supervisor::{Supervisor, SupervisorHandle, WorkerCommand, WorkerSpec};

use std::net::SocketAddr;

use axum::{Router, extract::DefaultBodyLimit};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// One transform worker.
pub struct Server {
    /// Application state.
    state: AppState,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            state: AppState::new(config),
        }
    }

    /// Create a server from a pre-built application state.
    pub fn from_state(state: AppState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the router with all routes and middleware.
    pub fn router(&self) -> Router {
        let router = Router::new()
            .merge(routes::health_routes())
            .nest("/transform", self.transform_routes());

        let router = if self.state.config.request_logging {
            router.layer(axum::middleware::from_fn(
                middleware::request_logging_middleware,
            ))
        } else {
            router
        };

        middleware::with_security_headers(router)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    fn transform_routes(&self) -> Router<AppState> {
        use axum::routing::{get, post};

        Router::new()
            .route("/resize", post(routes::resize_handler))
            .route("/rotate", post(routes::rotate_handler))
            .route("/flip", post(routes::flip_handler))
            .route("/download/{id}", get(routes::download_handler))
            .route("/sessions/{id}", get(routes::get_session_handler))
            .layer(DefaultBodyLimit::max(self.state.config.max_upload_bytes))
    }

    /// Run the server on the configured address until the process ends.
    pub async fn run(self) -> Result<()> {
        let addr = self.state.config.bind_address;
        self.run_on(addr).await
    }

    /// Run the server on a specific address (useful for testing).
    pub async fn run_on(self, addr: SocketAddr) -> Result<()> {
        self.run_until(addr, std::future::pending()).await
    }

    /// Run on `addr` until `shutdown` resolves, then drain open requests.
    pub async fn run_until(
        self,
        addr: SocketAddr,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let router = self.router();

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Internal(format!("Failed to bind {addr}: {e}")))?;

        info!(
            worker = self.state.worker_index(),
            "Starting transform server on {}", addr
        );

        let cleanup = self.state.sessions.spawn_cleanup_task();
        let served = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await;
        cleanup.abort();

        served.map_err(|e| ServerError::Internal(format!("Server error: {e}")))
    }

    /// Get the configured bind address.
    pub fn bind_address(&self) -> SocketAddr {
        self.state.config.bind_address
    }
}
