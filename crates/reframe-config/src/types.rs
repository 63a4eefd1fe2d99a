//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [server]     # front HTTP listener
//! [session]    # per-process session store
//! [workers]    # worker processes and codec threads
//! [limits]     # image size limits
//! ```

use std::time::Duration;

use reframe_types::config_defaults as defaults;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// Maps to the full TOML config file. All sections are optional so that
/// partial configs (e.g., project-local overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReframeConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<WorkersConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limits: Option<LimitsConfig>,
}

impl ReframeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// A config with every section present at its default values.
    pub fn with_defaults() -> Self {
        Self {
            server: Some(ServerConfig::default()),
            session: Some(SessionConfig::default()),
            workers: Some(WorkersConfig::default()),
            limits: Some(LimitsConfig::default()),
        }
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: ReframeConfig) {
        if other.server.is_some() {
            self.server = other.server;
        }
        if other.session.is_some() {
            self.session = other.session;
        }
        if other.workers.is_some() {
            self.workers = other.workers;
        }
        if other.limits.is_some() {
            self.limits = other.limits;
        }
    }

    pub fn server_config(&self) -> ServerConfig {
        self.server.clone().unwrap_or_default()
    }

    pub fn session_config(&self) -> SessionConfig {
        self.session.clone().unwrap_or_default()
    }

    pub fn workers_config(&self) -> WorkersConfig {
        self.workers.clone().unwrap_or_default()
    }

    pub fn limits_config(&self) -> LimitsConfig {
        self.limits.clone().unwrap_or_default()
    }

    pub fn server_mut(&mut self) -> &mut ServerConfig {
        self.server.get_or_insert_with(ServerConfig::default)
    }

    pub fn session_mut(&mut self) -> &mut SessionConfig {
        self.session.get_or_insert_with(SessionConfig::default)
    }

    pub fn workers_mut(&mut self) -> &mut WorkersConfig {
        self.workers.get_or_insert_with(WorkersConfig::default)
    }

    pub fn limits_mut(&mut self) -> &mut LimitsConfig {
        self.limits.get_or_insert_with(LimitsConfig::default)
    }

    /// Check value ranges across all sections.
    pub fn validate(&self) -> Result<()> {
        let server = self.server_config();
        let session = self.session_config();
        let workers = self.workers_config();
        let limits = self.limits_config();

        if server.max_upload_bytes == 0 {
            return Err(ConfigError::invalid("server.max_upload_bytes", "must be > 0"));
        }
        if server.request_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "server.request_timeout_secs",
                "must be > 0",
            ));
        }
        if session.max_sessions == 0 {
            return Err(ConfigError::invalid("session.max_sessions", "must be > 0"));
        }
        if session.max_bytes == 0 {
            return Err(ConfigError::invalid("session.max_bytes", "must be > 0"));
        }
        if session.cleanup_interval_secs == 0 {
            return Err(ConfigError::invalid(
                "session.cleanup_interval_secs",
                "must be > 0",
            ));
        }
        if session.max_pending_per_session == 0 {
            return Err(ConfigError::invalid(
                "session.max_pending_per_session",
                "must be > 0",
            ));
        }
        if let Some(count) = workers.count
            && count > defaults::MAX_WORKERS
        {
            return Err(ConfigError::invalid(
                "workers.count",
                format!("at most {} workers are supported", defaults::MAX_WORKERS),
            ));
        }
        if usize::from(workers.base_port) + workers.resolved_count() > usize::from(u16::MAX) + 1 {
            return Err(ConfigError::invalid(
                "workers.base_port",
                "worker ports would run past 65535",
            ));
        }
        let count = workers.resolved_count();
        if count > 0 {
            if workers.base_port == 0 {
                return Err(ConfigError::invalid(
                    "workers.base_port",
                    "must be > 0 when workers are enabled",
                ));
            }
            let first = usize::from(workers.base_port);
            let last = first + count - 1;
            if (first..=last).contains(&usize::from(server.port)) {
                return Err(ConfigError::invalid(
                    "server.port",
                    format!("{} collides with worker ports {first}..={last}", server.port),
                ));
            }
        }
        if workers.codec_threads == Some(0) {
            return Err(ConfigError::invalid("workers.codec_threads", "must be > 0"));
        }
        if limits.max_dimension == 0 {
            return Err(ConfigError::invalid("limits.max_dimension", "must be > 0"));
        }
        if limits.max_decode_pixels == 0 {
            return Err(ConfigError::invalid(
                "limits.max_decode_pixels",
                "must be > 0",
            ));
        }
        Ok(())
    }
}

impl reframe_types::ConfigProvider for ReframeConfig {}

impl reframe_types::HasCodecConfig for ReframeConfig {
    fn codec_threads(&self) -> usize {
        self.workers_config().resolved_codec_threads()
    }

    fn max_dimension(&self) -> u32 {
        self.limits_config().max_dimension
    }

    fn max_decode_pixels(&self) -> u64 {
        self.limits_config().max_decode_pixels
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server_config().request_timeout_secs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Front HTTP listener configuration.
///
/// ```toml
/// [server]
/// bind = "127.0.0.1"
/// port = 8080
/// request_logging = true
/// max_upload_bytes = 52428800
/// request_timeout_secs = 300
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind: String,
    /// Port to listen on.
    pub port: u16,
    /// Enable request logging.
    pub request_logging: bool,
    /// Largest accepted request body.
    pub max_upload_bytes: usize,
    /// Deadline for one transform request.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: defaults::DEFAULT_BIND.to_string(),
            port: defaults::DEFAULT_PORT,
            request_logging: true,
            max_upload_bytes: defaults::MAX_UPLOAD_BYTES,
            request_timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Session store configuration (applies to each worker separately).
///
/// ```toml
/// [session]
/// max_sessions = 100
/// max_bytes = 536870912
/// ttl_secs = 1800
/// cleanup_interval_secs = 60
/// max_pending_per_session = 16
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum number of sessions before LRU eviction.
    pub max_sessions: usize,
    /// Maximum aggregate size of stored images.
    pub max_bytes: usize,
    /// Idle seconds before a session expires; 0 disables expiry.
    pub ttl_secs: u64,
    /// Interval in seconds between expiry sweeps.
    pub cleanup_interval_secs: u64,
    /// Requests allowed to wait on one busy session before answering 429.
    pub max_pending_per_session: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: defaults::MAX_SESSIONS,
            max_bytes: defaults::MAX_SESSION_BYTES,
            ttl_secs: defaults::SESSION_TTL_SECS,
            cleanup_interval_secs: defaults::CLEANUP_INTERVAL_SECS,
            max_pending_per_session: defaults::MAX_PENDING_PER_SESSION,
        }
    }
}

impl reframe_types::ConfigProvider for SessionConfig {}

impl reframe_types::HasSessionConfig for SessionConfig {
    fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    fn session_ttl(&self) -> Option<Duration> {
        (self.ttl_secs > 0).then(|| Duration::from_secs(self.ttl_secs))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Worker Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Worker pool configuration.
///
/// ```toml
/// [workers]
/// count = 3             # omit for min(cores, 3); 0 serves in-process
/// base_port = 8081
/// codec_threads = 8     # omit for min(cores * 2, 16)
/// restart_delay_ms = 500
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    /// Worker `i` listens on `base_port + i`.
    pub base_port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codec_threads: Option<usize>,
    /// Pause before respawning a worker that exited.
    pub restart_delay_ms: u64,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            count: None,
            base_port: defaults::WORKER_BASE_PORT,
            codec_threads: None,
            restart_delay_ms: defaults::RESTART_DELAY_MS,
        }
    }
}

impl WorkersConfig {
    /// Configured count, or `min(cores, 3)`; never above the hard cap.
    pub fn resolved_count(&self) -> usize {
        self.count
            .unwrap_or_else(defaults::worker_count)
            .min(defaults::MAX_WORKERS)
    }

    pub fn resolved_codec_threads(&self) -> usize {
        self.codec_threads
            .unwrap_or_else(defaults::codec_threads)
            .max(1)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Limits Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Image size limits.
///
/// ```toml
/// [limits]
/// max_dimension = 15000
/// max_decode_pixels = 268402689
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest width or height a resize may request or produce.
    pub max_dimension: u32,
    /// Largest pixel count accepted when decoding an image.
    pub max_decode_pixels: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_dimension: defaults::MAX_DIMENSION,
            max_decode_pixels: defaults::MAX_DECODE_PIXELS,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use reframe_types::{HasCodecConfig, HasSessionConfig};

    #[test]
    fn test_empty_config() {
        let config = ReframeConfig::from_toml("").unwrap();
        assert!(config.server.is_none());
        assert!(config.session.is_none());
        assert_eq!(config.server_config(), ServerConfig::default());
    }

    #[test]
    fn test_server_defaults() {
        let config = ReframeConfig::from_toml("[server]\n").unwrap();
        let server = config.server.as_ref().unwrap();
        assert_eq!(server.port, 8080);
        assert_eq!(server.bind, "127.0.0.1");
        assert_eq!(server.max_upload_bytes, 50 * 1024 * 1024);
        assert!(server.request_logging);
    }

    #[test]
    fn test_full_config() {
        let toml = r#"
[server]
bind = "0.0.0.0"
port = 9000
request_timeout_secs = 30

[session]
max_sessions = 10
ttl_secs = 0

[workers]
count = 2
base_port = 9100

[limits]
max_dimension = 4096
"#;
        let config = ReframeConfig::from_toml(toml).unwrap();
        assert_eq!(config.server_config().port, 9000);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.session_config().max_sessions, 10);
        assert_eq!(config.session_config().session_ttl(), None);
        assert_eq!(config.workers_config().resolved_count(), 2);
        assert_eq!(config.workers_config().base_port, 9100);
        assert_eq!(config.max_dimension(), 4096);
        assert_eq!(config.max_decode_pixels(), 268_402_689);
        config.validate().unwrap();
    }

    #[test]
    fn test_merge_replaces_sections() {
        let mut base =
            ReframeConfig::from_toml("[server]\nport = 1000\n[session]\nmax_sessions = 5\n")
                .unwrap();
        let overlay = ReframeConfig::from_toml("[server]\nport = 2000\n").unwrap();
        base.merge(overlay);

        assert_eq!(base.server_config().port, 2000);
        assert_eq!(base.session_config().max_sessions, 5);
    }

    #[test]
    fn test_unknown_sections_ignored() {
        let config = ReframeConfig::from_toml("[telemetry]\nenabled = true\n").unwrap();
        assert_eq!(config, ReframeConfig::default());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = ReframeConfig::with_defaults();
        let text = config.to_toml().unwrap();
        assert!(text.contains("[server]"));
        assert!(!text.contains("count"));

        let parsed = ReframeConfig::from_toml(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_worker_count_capped() {
        let workers = WorkersConfig {
            count: Some(64),
            ..Default::default()
        };
        assert_eq!(workers.resolved_count(), 16);

        let mut config = ReframeConfig::new();
        config.workers = Some(workers);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { ref field, .. }) if field == "workers.count"
        ));
    }

    #[test]
    fn test_zero_workers_is_in_process() {
        let workers = WorkersConfig {
            count: Some(0),
            ..Default::default()
        };
        assert_eq!(workers.resolved_count(), 0);
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = ReframeConfig::new();
        config.limits_mut().max_dimension = 0;
        assert!(config.validate().is_err());

        let mut config = ReframeConfig::new();
        config.session_mut().max_pending_per_session = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_port_overflow() {
        let mut config = ReframeConfig::new();
        config.workers_mut().base_port = 65535;
        config.workers_mut().count = Some(2);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_router_port_in_worker_range() {
        let config =
            ReframeConfig::from_toml("[server]\nport = 8082\n[workers]\ncount = 3\nbase_port = 8081\n")
                .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { ref field, .. }) if field == "server.port"
        ));

        let config =
            ReframeConfig::from_toml("[server]\nport = 8084\n[workers]\ncount = 3\nbase_port = 8081\n")
                .unwrap();
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_zero_base_port() {
        let mut config = ReframeConfig::new();
        config.workers_mut().count = Some(2);
        config.workers_mut().base_port = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { ref field, .. }) if field == "workers.base_port"
        ));

        // In-process mode never binds worker ports.
        config.workers_mut().count = Some(0);
        config.validate().unwrap();
    }
}
