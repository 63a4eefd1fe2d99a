//! Runtime configuration for one transform worker.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use reframe_config::ReframeConfig;
use reframe_image::CodecLimits;
use reframe_session::CacheConfig;
use reframe_types::{HasCodecConfig, config_defaults as defaults};

use crate::error::{Result, ServerError};

/// Worker server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to.
    pub bind_address: SocketAddr,

    /// Index stamped into every session ID this worker mints.
    pub worker_index: u16,

    /// Enable request logging.
    pub request_logging: bool,

    /// Maximum request body size in bytes.
    pub max_upload_bytes: usize,

    /// Deadline for one transform request, including time spent queued
    /// behind other requests on the same session.
    pub request_timeout: Duration,

    /// Waiters allowed per session before answering `busy`.
    pub max_pending_per_session: usize,

    /// Concurrent codec jobs in this process.
    pub codec_threads: usize,

    pub limits: CodecLimits,

    pub cache: CacheConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], defaults::DEFAULT_PORT)),
            worker_index: 0,
            request_logging: true,
            max_upload_bytes: defaults::MAX_UPLOAD_BYTES,
            request_timeout: defaults::request_timeout(),
            max_pending_per_session: defaults::MAX_PENDING_PER_SESSION,
            codec_threads: defaults::codec_threads(),
            limits: CodecLimits::new(defaults::MAX_DIMENSION, defaults::MAX_DECODE_PIXELS),
            cache: CacheConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the loaded file/env configuration.
    ///
    /// The bind address comes from `[server]`; callers running a worker
    /// behind the front router override it with [`with_bind_address`](Self::with_bind_address).
    pub fn from_config(config: &ReframeConfig) -> Result<Self> {
        let server = config.server_config();
        let session = config.session_config();

        let ip: IpAddr = server.bind.parse().map_err(|_| {
            ServerError::Config(format!("invalid bind address '{}'", server.bind))
        })?;

        Ok(Self::default()
            .with_bind_address(SocketAddr::new(ip, server.port))
            .with_request_logging(server.request_logging)
            .with_max_upload_bytes(server.max_upload_bytes)
            .with_max_pending_per_session(session.max_pending_per_session)
            .with_codec_config(config)
            .with_cache(CacheConfig::from_provider(&session)))
    }

    /// Take codec threads, limits and the request deadline from any codec
    /// config provider.
    pub fn with_codec_config<C: HasCodecConfig>(mut self, config: &C) -> Self {
        self.codec_threads = config.codec_threads();
        self.limits = CodecLimits::new(config.max_dimension(), config.max_decode_pixels());
        self.request_timeout = config.request_timeout();
        self
    }

    pub fn with_bind_address(mut self, addr: SocketAddr) -> Self {
        self.bind_address = addr;
        self
    }

    /// Set the worker index (also used for minted session IDs).
    pub fn with_worker_index(mut self, index: u16) -> Self {
        self.worker_index = index;
        self.cache.worker = index;
        self
    }

    pub fn with_request_logging(mut self, enabled: bool) -> Self {
        self.request_logging = enabled;
        self
    }

    pub fn with_max_upload_bytes(mut self, max: usize) -> Self {
        self.max_upload_bytes = max;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_pending_per_session(mut self, max: usize) -> Self {
        self.max_pending_per_session = max;
        self
    }

    pub fn with_codec_threads(mut self, threads: usize) -> Self {
        self.codec_threads = threads;
        self
    }

    pub fn with_limits(mut self, limits: CodecLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Replace the session store settings, keeping this worker's index.
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache.with_worker(self.worker_index);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let toml = r#"
[server]
bind = "0.0.0.0"
port = 9000
request_logging = false
request_timeout_secs = 12

[session]
max_sessions = 5
max_pending_per_session = 2

[workers]
codec_threads = 3

[limits]
max_dimension = 800
"#;
        let config = ReframeConfig::from_toml(toml).unwrap();
        let server = ServerConfig::from_config(&config).unwrap();

        assert_eq!(server.bind_address, "0.0.0.0:9000".parse().unwrap());
        assert!(!server.request_logging);
        assert_eq!(server.request_timeout, Duration::from_secs(12));
        assert_eq!(server.max_pending_per_session, 2);
        assert_eq!(server.codec_threads, 3);
        assert_eq!(server.limits.max_dimension, 800);
        assert_eq!(server.cache.max_sessions, 5);
    }

    #[test]
    fn test_invalid_bind() {
        let config = ReframeConfig::from_toml("[server]\nbind = \"not an ip\"\n").unwrap();
        assert!(matches!(
            ServerConfig::from_config(&config),
            Err(ServerError::Config(_))
        ));
    }

    #[test]
    fn test_with_codec_config() {
        let provider = reframe_types::CodecConfigProvider {
            codec_threads: 2,
            max_dimension: 640,
            max_decode_pixels: 1_000_000,
            request_timeout: Duration::from_secs(9),
        };
        let config = ServerConfig::new().with_codec_config(&provider);
        assert_eq!(config.codec_threads, 2);
        assert_eq!(config.limits, CodecLimits::new(640, 1_000_000));
        assert_eq!(config.request_timeout, Duration::from_secs(9));
    }

    #[test]
    fn test_worker_index_flows_into_cache() {
        let config = ServerConfig::new()
            .with_worker_index(2)
            .with_cache(CacheConfig::new().with_max_sessions(9));
        assert_eq!(config.worker_index, 2);
        assert_eq!(config.cache.worker, 2);
        assert_eq!(config.cache.max_sessions, 9);
    }
}
