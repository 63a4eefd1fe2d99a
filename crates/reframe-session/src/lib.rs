//! Bounded, process-local session store for Reframe.
//!
//! Each session holds one complete encoded image. The store provides:
//! - LRU eviction bounded by both entry count and aggregate bytes
//! - TTL expiry of idle sessions, lazily on access and by a sweep task
//! - Eviction hooks so the owner can log or count dropped sessions
//!
//! # Example
//!
//! ```rust,ignore
//! use reframe_session::{CacheConfig, ImageState, SessionCache};
//!
//! let cache = SessionCache::new(CacheConfig::default().with_worker(0));
//! let session = cache.create(ImageState::new(bytes, format, w, h), None).await?;
//! let again = cache.get(&session.id).await?;
//! ```

mod cache;
mod config;
mod error;
mod eviction;
mod id;
mod session;
mod ttl;

pub use cache::{CacheStats, SessionCache};
pub use config::CacheConfig;
pub use error::{Error, Result};
pub use eviction::{EvictionHook, EvictionReason, NoopHook};
pub use id::SessionId;
pub use session::{ImageState, Session};
pub use ttl::TtlTracker;
