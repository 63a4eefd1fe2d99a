//! Health check endpoints.

use axum::{Json, Router, extract::State, routing::get};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

/// Session store figures reported by a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionsHealth {
    pub active: usize,
    pub capacity: usize,
    pub bytes: usize,
    pub max_bytes: usize,
    pub evictions: u64,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service version.
    pub version: String,
    /// Index of the answering worker.
    pub worker: u16,
    pub sessions: SessionsHealth,
}

/// Health check with session store figures.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.sessions.stats().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        worker: state.worker_index(),
        sessions: SessionsHealth {
            active: stats.size,
            capacity: stats.capacity,
            bytes: stats.bytes,
            max_bytes: stats.max_bytes,
            evictions: stats.evictions,
        },
    })
}

/// Create health check routes.
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
