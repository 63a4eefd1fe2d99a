//! Configuration traits for decoupled config passing between crates.
//!
//! These traits allow components to depend on configuration capabilities without
//! requiring direct knowledge of the full configuration structure. Each trait
//! represents a specific configuration capability.

use std::time::Duration;

/// Base trait for all configuration types.
///
/// Provides common functionality expected of all config types. Implementations
/// should be cheaply cloneable and thread-safe.
pub trait ConfigProvider: Clone + Send + Sync + 'static {}

/// Session store configuration.
///
/// Provides settings for session cache behavior including LRU eviction,
/// aggregate byte bounds and cleanup intervals.
pub trait HasSessionConfig: ConfigProvider {
    /// Maximum number of sessions to keep in cache before LRU eviction.
    fn max_sessions(&self) -> usize;

    /// Maximum aggregate size of all cached image buffers, in bytes.
    fn max_bytes(&self) -> usize;

    /// Interval between cleanup runs for expired sessions.
    fn cleanup_interval(&self) -> Duration;

    /// Idle time after which a session expires (None = no expiry).
    fn session_ttl(&self) -> Option<Duration> {
        Some(Duration::from_secs(defaults::SESSION_TTL_SECS))
    }
}

/// Codec and transform configuration.
///
/// Provides the limits applied around CPU-bound decode/encode work.
pub trait HasCodecConfig: ConfigProvider {
    /// Number of codec jobs allowed to run at once in this process.
    fn codec_threads(&self) -> usize;

    /// Largest width or height a transform may produce.
    fn max_dimension(&self) -> u32;

    /// Largest pixel count a decoded image may have.
    fn max_decode_pixels(&self) -> u64;

    /// Overall deadline for one transform request.
    fn request_timeout(&self) -> Duration {
        Duration::from_secs(defaults::REQUEST_TIMEOUT_SECS)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Default implementations for common types
// ─────────────────────────────────────────────────────────────────────────────

/// Default configuration values.
pub mod defaults {
    use std::time::Duration;

    pub const MAX_SESSIONS: usize = 100;
    /// 512 MiB of encoded image data per process.
    pub const MAX_SESSION_BYTES: usize = 512 * 1024 * 1024;
    pub const SESSION_TTL_SECS: u64 = 30 * 60;
    pub const CLEANUP_INTERVAL_SECS: u64 = 60;
    pub const MAX_PENDING_PER_SESSION: usize = 16;
    pub const DEFAULT_PORT: u16 = 8080;
    pub const DEFAULT_BIND: &str = "127.0.0.1";
    /// Worker `i` listens on `WORKER_BASE_PORT + i`.
    pub const WORKER_BASE_PORT: u16 = 8081;
    /// 50 MiB upload limit.
    pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;
    pub const REQUEST_TIMEOUT_SECS: u64 = 300;
    pub const MAX_DIMENSION: u32 = 15_000;
    /// Roughly 16k x 16k.
    pub const MAX_DECODE_PIXELS: u64 = 268_402_689;
    /// Default worker count never exceeds this, whatever the core count.
    pub const WORKER_CEILING: usize = 3;
    /// Hard upper bound for an explicitly configured worker count.
    pub const MAX_WORKERS: usize = 16;
    pub const MAX_CODEC_THREADS: usize = 16;
    pub const RESTART_DELAY_MS: u64 = 500;

    pub fn cleanup_interval() -> Duration {
        Duration::from_secs(CLEANUP_INTERVAL_SECS)
    }

    pub fn session_ttl() -> Duration {
        Duration::from_secs(SESSION_TTL_SECS)
    }

    pub fn request_timeout() -> Duration {
        Duration::from_secs(REQUEST_TIMEOUT_SECS)
    }

    /// Number of CPU cores visible to this process (at least 1).
    pub fn available_cores() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    /// `min(cores, WORKER_CEILING)`.
    pub fn worker_count() -> usize {
        available_cores().min(WORKER_CEILING)
    }

    /// `min(cores * 2, MAX_CODEC_THREADS)`.
    pub fn codec_threads() -> usize {
        (available_cores() * 2).min(MAX_CODEC_THREADS)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Simple wrapper types for standalone config passing
// ─────────────────────────────────────────────────────────────────────────────

/// Standalone session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfigProvider {
    pub max_sessions: usize,
    pub max_bytes: usize,
    pub cleanup_interval: Duration,
    pub session_ttl: Option<Duration>,
}

impl Default for SessionConfigProvider {
    fn default() -> Self {
        Self {
            max_sessions: defaults::MAX_SESSIONS,
            max_bytes: defaults::MAX_SESSION_BYTES,
            cleanup_interval: defaults::cleanup_interval(),
            session_ttl: Some(defaults::session_ttl()),
        }
    }
}

impl ConfigProvider for SessionConfigProvider {}

impl HasSessionConfig for SessionConfigProvider {
    fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    fn cleanup_interval(&self) -> Duration {
        self.cleanup_interval
    }

    fn session_ttl(&self) -> Option<Duration> {
        self.session_ttl
    }
}

/// Standalone codec configuration.
#[derive(Debug, Clone)]
pub struct CodecConfigProvider {
    pub codec_threads: usize,
    pub max_dimension: u32,
    pub max_decode_pixels: u64,
    pub request_timeout: Duration,
}

impl Default for CodecConfigProvider {
    fn default() -> Self {
        Self {
            codec_threads: defaults::codec_threads(),
            max_dimension: defaults::MAX_DIMENSION,
            max_decode_pixels: defaults::MAX_DECODE_PIXELS,
            request_timeout: defaults::request_timeout(),
        }
    }
}

impl ConfigProvider for CodecConfigProvider {}

impl HasCodecConfig for CodecConfigProvider {
    fn codec_threads(&self) -> usize {
        self.codec_threads
    }

    fn max_dimension(&self) -> u32 {
        self.max_dimension
    }

    fn max_decode_pixels(&self) -> u64 {
        self.max_decode_pixels
    }

    fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_worker_count_is_capped() {
        let count = defaults::worker_count();
        assert!(count >= 1);
        assert!(count <= defaults::WORKER_CEILING);
    }

    #[test]
    fn test_default_codec_threads_is_capped() {
        let threads = defaults::codec_threads();
        assert!(threads >= 2);
        assert!(threads <= defaults::MAX_CODEC_THREADS);
    }

    #[test]
    fn test_session_provider_defaults() {
        let provider = SessionConfigProvider::default();
        assert_eq!(provider.max_sessions(), 100);
        assert_eq!(provider.session_ttl(), Some(Duration::from_secs(1800)));
        assert_eq!(provider.cleanup_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_codec_provider_defaults() {
        let provider = CodecConfigProvider::default();
        assert_eq!(provider.max_dimension(), 15_000);
        assert_eq!(provider.request_timeout(), Duration::from_secs(300));
    }
}
