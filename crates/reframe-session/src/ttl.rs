//! Idle-time tracking for session expiration.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::id::SessionId;

/// Tracks last access times for TTL-based expiration.
#[derive(Debug)]
pub struct TtlTracker {
    access_times: HashMap<SessionId, Instant>,

    /// None means sessions never expire.
    ttl: Option<Duration>,
}

impl TtlTracker {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            access_times: HashMap::new(),
            ttl,
        }
    }

    /// Record an access (resets the idle timer).
    pub fn touch(&mut self, id: &SessionId) {
        self.access_times.insert(*id, Instant::now());
    }

    /// An untracked session counts as expired.
    pub fn is_expired(&self, id: &SessionId) -> bool {
        match self.access_times.get(id) {
            None => true,
            Some(last_access) => self.ttl.is_some_and(|ttl| last_access.elapsed() > ttl),
        }
    }

    pub fn remove(&mut self, id: &SessionId) {
        self.access_times.remove(id);
    }

    /// Remove all expired entries and return their IDs.
    pub fn drain_expired(&mut self) -> Vec<SessionId> {
        let Some(ttl) = self.ttl else {
            return Vec::new();
        };
        let now = Instant::now();
        let expired: Vec<SessionId> = self
            .access_times
            .iter()
            .filter(|(_, last_access)| now.duration_since(**last_access) > ttl)
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            self.access_times.remove(id);
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.access_times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.access_times.is_empty()
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }
}
