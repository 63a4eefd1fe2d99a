//! Front router with sticky routing.
//!
//! Every session ID names the worker that minted it (`w<index>-<token>`).
//! Requests that carry an ID, either in the download/metadata path or as
//! `sessionId` in a JSON body, are forwarded to that worker. Requests
//! without one are new uploads and go round-robin, skipping workers that
//! refuse the connection.
//!
//! A worker that is down, or that came back without its sessions, answers
//! for its IDs as `not_found`; the router never waits on it longer than
//! the upstream timeout.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::{
    Json, Router,
    body::Body,
    extract::{DefaultBodyLimit, State, rejection::BytesRejection},
    http::{HeaderMap, HeaderName, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use reframe_session::SessionId;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::error::{Result, ServerError};
use crate::middleware;
use crate::routes::{HealthResponse, SessionsHealth};

/// Front router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Address clients connect to.
    pub bind_address: SocketAddr,

    /// Worker addresses; position `i` serves IDs tagged `w<i>`.
    pub workers: Vec<SocketAddr>,

    pub request_logging: bool,

    /// Maximum request body size in bytes.
    pub max_upload_bytes: usize,

    /// Deadline for one forwarded request.
    pub upstream_timeout: Duration,

    pub connect_timeout: Duration,

    /// Deadline for each worker's health probe.
    pub health_timeout: Duration,
}

impl RouterConfig {
    pub fn new(bind_address: SocketAddr, workers: Vec<SocketAddr>) -> Self {
        use reframe_types::config_defaults as defaults;

        Self {
            bind_address,
            workers,
            request_logging: true,
            max_upload_bytes: defaults::MAX_UPLOAD_BYTES,
            upstream_timeout: defaults::request_timeout() + Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
            health_timeout: Duration::from_secs(2),
        }
    }

    pub fn with_request_logging(mut self, enabled: bool) -> Self {
        self.request_logging = enabled;
        self
    }

    pub fn with_max_upload_bytes(mut self, max: usize) -> Self {
        self.max_upload_bytes = max;
        self
    }

    pub fn with_upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }
}

#[derive(Clone)]
struct RouterState {
    config: Arc<RouterConfig>,
    client: reqwest::Client,
    next: Arc<AtomicUsize>,
}

/// Forwards client requests to transform workers.
pub struct FrontRouter {
    state: RouterState,
}

impl FrontRouter {
    pub fn new(config: RouterConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.upstream_timeout)
            .connect_timeout(config.connect_timeout)
            // A dead worker must surface as a connect error, not as a stale pooled connection.
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| ServerError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            state: RouterState {
                config: Arc::new(config),
                client,
                next: Arc::new(AtomicUsize::new(0)),
            },
        })
    }

    pub fn router(&self) -> Router {
        let router = Router::new()
            .route("/health", get(router_health))
            .fallback(proxy)
            .layer(DefaultBodyLimit::max(self.state.config.max_upload_bytes));

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

    pub async fn run(self) -> Result<()> {
        let addr = self.state.config.bind_address;
        self.run_until(addr, std::future::pending()).await
    }

    /// Run the router on a specific address (useful for testing).
    pub async fn run_on(self, addr: SocketAddr) -> Result<()> {
        self.run_until(addr, std::future::pending()).await
    }

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
            workers = self.state.config.workers.len(),
            "Starting front router on {}", addr
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Internal(format!("Server error: {e}")))
    }

    pub fn bind_address(&self) -> SocketAddr {
        self.state.config.bind_address
    }
}

/// Health of one worker as seen by the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerHealth {
    pub index: usize,
    pub address: String,
    pub up: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sessions: Option<SessionsHealth>,
}

/// Router health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterHealth {
    /// `ok`, `degraded` (some workers down) or `unavailable`.
    pub status: String,
    pub version: String,
    pub workers: Vec<WorkerHealth>,
}

async fn router_health(State(state): State<RouterState>) -> Response {
    let mut probes = tokio::task::JoinSet::new();
    for (index, addr) in state.config.workers.iter().copied().enumerate() {
        let client = state.client.clone();
        let timeout = state.config.health_timeout;
        probes.spawn(async move {
            let health = probe_worker(&client, addr, timeout).await;
            WorkerHealth {
                index,
                address: addr.to_string(),
                up: health.is_some(),
                sessions: health.map(|h| h.sessions),
            }
        });
    }

    let mut workers = probes.join_all().await;
    workers.sort_by_key(|w| w.index);

    let up = workers.iter().filter(|w| w.up).count();
    let (status_code, status) = if up == workers.len() && up > 0 {
        (StatusCode::OK, "ok")
    } else if up > 0 {
        (StatusCode::OK, "degraded")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    };

    let body = RouterHealth {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        workers,
    };
    (status_code, Json(body)).into_response()
}

async fn probe_worker(
    client: &reqwest::Client,
    addr: SocketAddr,
    timeout: Duration,
) -> Option<HealthResponse> {
    let response = client
        .get(format!("http://{addr}/health"))
        .timeout(timeout)
        .send()
        .await
        .ok()?;
    if !response.status().is_success() {
        return None;
    }
    response.json().await.ok()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionRef {
    session_id: Option<String>,
}

/// Session ID a request refers to, if any.
fn session_id_for(uri: &Uri, headers: &HeaderMap, body: &[u8]) -> Option<String> {
    if let Some(id) = session_id_from_path(uri.path()) {
        return Some(id.to_string());
    }

    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));
    if !is_json || body.is_empty() {
        return None;
    }
    serde_json::from_slice::<SessionRef>(body)
        .ok()
        .and_then(|r| r.session_id)
}

fn session_id_from_path(path: &str) -> Option<&str> {
    ["/transform/download/", "/transform/sessions/"]
        .iter()
        .find_map(|prefix| path.strip_prefix(prefix))
        .map(|rest| rest.split('/').next().unwrap_or(rest))
        .filter(|id| !id.is_empty())
}

async fn proxy(
    State(state): State<RouterState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<Response> {
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ServerError::CapacityExceeded(rejection.body_text())
        } else {
            ServerError::InvalidParams(rejection.body_text())
        }
    })?;

    let upstream = Upstream {
        method,
        path: uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| uri.path().to_string()),
        headers,
        body,
    };

    match session_id_for(&uri, &upstream.headers, &upstream.body) {
        Some(id) => forward_sticky(&state, &id, &upstream).await,
        None => forward_round_robin(&state, &upstream).await,
    }
}

struct Upstream {
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Bytes,
}

async fn forward_sticky(
    state: &RouterState,
    raw_id: &str,
    upstream: &Upstream,
) -> Result<Response> {
    let id: SessionId = raw_id.parse()?;
    let index = usize::from(id.worker());
    let addr = state
        .config
        .workers
        .get(index)
        .copied()
        .ok_or_else(|| ServerError::NotFound(raw_id.to_string()))?;

    debug!(session_id = raw_id, worker = index, "Forwarding to owning worker");

    forward(state, addr, upstream)
        .await
        .map_err(|e| sticky_error(raw_id, index, &e, state.config.upstream_timeout))
}

/// A connect failure (including a connect timeout) means the owner is gone,
/// so its sessions are too. Only a timeout on an established request is 504.
fn sticky_error(
    raw_id: &str,
    worker: usize,
    e: &reqwest::Error,
    timeout: Duration,
) -> ServerError {
    if e.is_timeout() && !e.is_connect() {
        ServerError::ProcessingTimeout(timeout.as_millis() as u64)
    } else {
        warn!(session_id = raw_id, worker, error = %e, "Owning worker unreachable");
        ServerError::NotFound(raw_id.to_string())
    }
}

async fn forward_round_robin(state: &RouterState, upstream: &Upstream) -> Result<Response> {
    let workers = &state.config.workers;
    if workers.is_empty() {
        return Err(ServerError::ServiceUnavailable("no workers configured".to_string()));
    }

    let start = state.next.fetch_add(1, Ordering::Relaxed);
    for offset in 0..workers.len() {
        let index = (start + offset) % workers.len();
        match forward(state, workers[index], upstream).await {
            Ok(response) => return Ok(response),
            Err(e) if e.is_connect() => {
                warn!(worker = index, error = %e, "Worker refused connection, trying next");
            }
            Err(e) if e.is_timeout() => {
                return Err(ServerError::ProcessingTimeout(
                    state.config.upstream_timeout.as_millis() as u64,
                ));
            }
            Err(e) => {
                return Err(ServerError::ServiceUnavailable(format!(
                    "worker {index} failed: {e}"
                )));
            }
        }
    }

    Err(ServerError::ServiceUnavailable(
        "no worker accepted the request".to_string(),
    ))
}

async fn forward(
    state: &RouterState,
    addr: SocketAddr,
    upstream: &Upstream,
) -> reqwest::Result<Response> {
    let url = format!("http://{addr}{}", upstream.path);

    let mut request = state
        .client
        .request(upstream.method.clone(), url)
        .body(upstream.body.clone());
    for (name, value) in upstream.headers.iter() {
        if forwards(name) {
            request = request.header(name, value);
        }
    }

    let reply = request.send().await?;
    let status = reply.status();
    let headers = reply.headers().clone();
    let body = reply.bytes().await?;

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    for (name, value) in headers.iter() {
        if forwards(name) {
            response.headers_mut().append(name, value.clone());
        }
    }
    Ok(response)
}

/// Hop-by-hop and framing headers are not copied between connections.
fn forwards(name: &HeaderName) -> bool {
    !matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
            | "host"
            | "content-length"
    )
}
