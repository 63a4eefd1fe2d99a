//! Session store with LRU eviction, a byte budget and TTL expiry.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use lru::LruCache;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::eviction::{EvictionHook, EvictionReason, NoopHook};
use crate::id::SessionId;
use crate::session::{ImageState, Session};
use crate::ttl::TtlTracker;

/// Inner state protected by RwLock.
struct CacheInner<H: EvictionHook> {
    lru: LruCache<SessionId, Session>,
    ttl: TtlTracker,
    /// Sum of `size_bytes()` over every stored session.
    total_bytes: usize,
    evictions: u64,
    hook: H,
}

impl<H: EvictionHook> CacheInner<H> {
    /// Drop `id` if its TTL ran out. Returns true when it was dropped.
    fn expire_if_stale(&mut self, id: &SessionId) -> bool {
        if !self.ttl.is_expired(id) {
            return false;
        }
        self.ttl.remove(id);
        if let Some(session) = self.lru.pop(id) {
            debug!(session_id = %id, "Session expired, removing from store");
            self.account_eviction(&session, EvictionReason::Expired);
        }
        true
    }

    fn evict_lru(&mut self, reason: EvictionReason) -> bool {
        match self.lru.pop_lru() {
            Some((id, session)) => {
                debug!(session_id = %id, %reason, size_bytes = session.size_bytes(), "Evicting LRU session");
                self.ttl.remove(&id);
                self.account_eviction(&session, reason);
                true
            }
            None => false,
        }
    }

    fn account_eviction(&mut self, session: &Session, reason: EvictionReason) {
        self.total_bytes = self.total_bytes.saturating_sub(session.size_bytes());
        self.evictions += 1;
        self.hook.on_evict(&session.id, reason, session.size_bytes());
    }

    fn purge_expired(&mut self) -> usize {
        let expired = self.ttl.drain_expired();
        let mut count = 0;
        for id in expired {
            if let Some(session) = self.lru.pop(&id) {
                debug!(session_id = %id, "Cleaning up expired session");
                self.account_eviction(&session, EvictionReason::Expired);
                count += 1;
            }
        }
        count
    }
}

/// Bounded store of sessions keyed by [`SessionId`].
///
/// This store provides:
/// - LRU eviction when the entry count or byte budget would be exceeded
/// - TTL expiry, checked on every access and by a periodic sweep
/// - An [`EvictionHook`] notified of every session the store drops
/// - Thread-safe access via RwLock
///
/// Stored buffers are immutable; [`replace`](Self::replace) swaps a whole
/// new [`ImageState`] in under the write lock, so readers always see a
/// complete image.
pub struct SessionCache<H: EvictionHook = NoopHook> {
    inner: Arc<RwLock<CacheInner<H>>>,
    config: CacheConfig,
}

impl SessionCache<NoopHook> {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_hook(config, NoopHook)
    }
}

impl<H: EvictionHook> SessionCache<H> {
    pub fn with_hook(config: CacheConfig, hook: H) -> Self {
        let cap = NonZeroUsize::new(config.max_sessions).unwrap_or(NonZeroUsize::MIN);

        let inner = CacheInner {
            lru: LruCache::new(cap),
            ttl: TtlTracker::new(config.ttl),
            total_bytes: 0,
            evictions: 0,
            hook,
        };

        Self {
            inner: Arc::new(RwLock::new(inner)),
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn capacity(&self) -> usize {
        self.config.max_sessions.max(1)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.lru.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.lru.is_empty()
    }

    /// Store a new session and return it with its freshly minted ID.
    ///
    /// Least recently used sessions are evicted until both the entry and
    /// byte limits have room for the new one.
    pub async fn create(&self, image: ImageState, original_name: Option<String>) -> Result<Session> {
        let size = image.size_bytes();
        if size > self.config.max_bytes {
            return Err(Error::CapacityExceeded {
                size,
                max: self.config.max_bytes,
            });
        }

        let mut inner = self.inner.write().await;
        inner.purge_expired();

        let mut id = SessionId::generate(self.config.worker);
        while inner.lru.contains(&id) {
            id = SessionId::generate(self.config.worker);
        }

        while inner.lru.len() >= self.capacity() {
            if !inner.evict_lru(EvictionReason::Capacity) {
                break;
            }
        }
        while inner.total_bytes + size > self.config.max_bytes {
            if !inner.evict_lru(EvictionReason::Bytes) {
                break;
            }
        }

        let session = Session::new(id, image, original_name);
        inner.lru.put(id, session.clone());
        inner.ttl.touch(&id);
        inner.total_bytes += size;

        trace!(
            session_id = %id,
            size_bytes = size,
            cache_size = inner.lru.len(),
            cache_bytes = inner.total_bytes,
            "Session created"
        );

        Ok(session)
    }

    /// Look a session up, marking it recently used and resetting its TTL.
    pub async fn get(&self, id: &SessionId) -> Result<Session> {
        let mut inner = self.inner.write().await;

        if inner.expire_if_stale(id) {
            return Err(Error::NotFound(id.to_string()));
        }

        let session = match inner.lru.get_mut(id) {
            Some(session) => {
                session.last_accessed_at = Utc::now();
                session.clone()
            }
            None => return Err(Error::NotFound(id.to_string())),
        };
        inner.ttl.touch(id);

        trace!(session_id = %id, "Session found in store");
        Ok(session)
    }

    /// Read a session without updating LRU order or TTL.
    pub async fn peek(&self, id: &SessionId) -> Result<Session> {
        let inner = self.inner.read().await;
        if inner.ttl.is_expired(id) {
            return Err(Error::NotFound(id.to_string()));
        }
        inner
            .lru
            .peek(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Atomically swap a new image into an existing session.
    ///
    /// On any error the previous image stays in place.
    pub async fn replace(&self, id: &SessionId, image: ImageState) -> Result<Session> {
        let size = image.size_bytes();
        if size > self.config.max_bytes {
            return Err(Error::CapacityExceeded {
                size,
                max: self.config.max_bytes,
            });
        }

        let mut inner = self.inner.write().await;

        if inner.expire_if_stale(id) {
            return Err(Error::NotFound(id.to_string()));
        }

        let (old_size, session) = match inner.lru.get_mut(id) {
            Some(session) => {
                let old_size = session.size_bytes();
                session.image = image;
                session.revision += 1;
                session.last_accessed_at = Utc::now();
                (old_size, session.clone())
            }
            None => return Err(Error::NotFound(id.to_string())),
        };
        inner.ttl.touch(id);
        inner.total_bytes = inner.total_bytes - old_size + size;

        // The replaced session is now the most recently used entry, and it
        // fits on its own, so this loop only ever drops other sessions.
        while inner.total_bytes > self.config.max_bytes && inner.lru.len() > 1 {
            if !inner.evict_lru(EvictionReason::Bytes) {
                break;
            }
        }

        trace!(
            session_id = %id,
            revision = session.revision,
            size_bytes = size,
            cache_bytes = inner.total_bytes,
            "Session replaced"
        );

        Ok(session)
    }

    /// Whether a live session exists (without touching it).
    pub async fn contains(&self, id: &SessionId) -> bool {
        let inner = self.inner.read().await;
        inner.lru.contains(id) && !inner.ttl.is_expired(id)
    }

    /// Drop every expired session. Returns how many were removed.
    pub async fn cleanup_expired(&self) -> usize {
        let count = self.inner.write().await.purge_expired();
        if count > 0 {
            debug!(count = count, "Cleaned up expired sessions");
        }
        count
    }

    /// Run [`cleanup_expired`](Self::cleanup_expired) every
    /// `cleanup_interval` until the returned handle is aborted.
    pub fn spawn_cleanup_task(&self) -> JoinHandle<()> {
        let cache = self.clone();
        let period = self.config.cleanup_interval.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                cache.cleanup_expired().await;
            }
        })
    }

    pub async fn stats(&self) -> CacheStats {
        let inner = self.inner.read().await;
        CacheStats {
            size: inner.lru.len(),
            capacity: self.capacity(),
            bytes: inner.total_bytes,
            max_bytes: self.config.max_bytes,
            evictions: inner.evictions,
        }
    }
}

impl<H: EvictionHook> Clone for SessionCache<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            config: self.config.clone(),
        }
    }
}

/// Store statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Current number of stored sessions.
    pub size: usize,

    /// Maximum number of sessions.
    pub capacity: usize,

    /// Aggregate size of stored buffers.
    pub bytes: usize,

    /// Maximum aggregate size.
    pub max_bytes: usize,

    /// Sessions dropped by eviction or expiry since startup.
    pub evictions: u64,
}
