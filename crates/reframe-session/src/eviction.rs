//! Eviction observers.
//!
//! The store calls an [`EvictionHook`] for every session it drops on its
//! own (never for lookups that simply miss). Hooks run while the store's
//! write lock is held, so they must be quick and must not call back into
//! the store.

use std::fmt;

use crate::id::SessionId;

/// Why a session left the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvictionReason {
    /// Entry count limit reached.
    Capacity,
    /// Aggregate byte limit reached.
    Bytes,
    /// Idle longer than the TTL.
    Expired,
}

impl EvictionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Capacity => "capacity",
            Self::Bytes => "bytes",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observer for sessions dropped by the store.
pub trait EvictionHook: Send + Sync + 'static {
    fn on_evict(&self, id: &SessionId, reason: EvictionReason, size_bytes: usize);
}

/// Hook that ignores evictions.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHook;

impl EvictionHook for NoopHook {
    fn on_evict(&self, _id: &SessionId, _reason: EvictionReason, _size_bytes: usize) {}
}
