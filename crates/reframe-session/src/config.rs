//! Configuration for the session store.

use std::time::Duration;

use reframe_types::{HasSessionConfig, config_defaults as defaults};

/// Configuration for the session store.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of sessions before LRU eviction.
    pub max_sessions: usize,

    /// Maximum aggregate size of all stored buffers.
    pub max_bytes: usize,

    /// Idle time after which a session expires.
    pub ttl: Option<Duration>,

    /// Interval for the background sweep of expired sessions.
    pub cleanup_interval: Duration,

    /// Worker index stamped into every ID this store mints.
    pub worker: u16,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_sessions: defaults::MAX_SESSIONS,
            max_bytes: defaults::MAX_SESSION_BYTES,
            ttl: Some(defaults::session_ttl()),
            cleanup_interval: defaults::cleanup_interval(),
            worker: 0,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from any session config provider.
    pub fn from_provider<C: HasSessionConfig>(config: &C) -> Self {
        Self {
            max_sessions: config.max_sessions(),
            max_bytes: config.max_bytes(),
            ttl: config.session_ttl(),
            cleanup_interval: config.cleanup_interval(),
            worker: 0,
        }
    }

    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    pub fn with_max_bytes(mut self, max: usize) -> Self {
        self.max_bytes = max;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Sessions only leave the store through capacity eviction.
    pub fn without_ttl(mut self) -> Self {
        self.ttl = None;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    pub fn with_worker(mut self, worker: u16) -> Self {
        self.worker = worker;
        self
    }
}
