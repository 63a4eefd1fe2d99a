//! Per-session request serialization.
//!
//! Every mutating request on a session runs inside that session's critical
//! section. The section is a fair (FIFO) tokio mutex, so requests apply in
//! the order they reached [`SessionSerializer::acquire`]. Slots are created
//! on demand and removed once nobody holds or waits on them.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use reframe_session::SessionId;
use tokio::sync::OwnedMutexGuard;

use crate::error::{Result, ServerError};

#[derive(Default)]
struct Slot {
    lock: Arc<tokio::sync::Mutex<()>>,
    /// Holder plus waiters.
    users: usize,
}

/// Keyed FIFO locks, one per live session.
pub struct SessionSerializer {
    slots: Mutex<HashMap<SessionId, Slot>>,
    max_pending: usize,
}

impl SessionSerializer {
    /// `max_pending` is the number of requests allowed to wait behind the
    /// one currently running.
    pub fn new(max_pending: usize) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            max_pending,
        }
    }

    /// Wait for exclusive access to `id`.
    ///
    /// Fails with [`ServerError::Busy`] when the queue for `id` is full.
    /// Dropping the returned guard, or the future before it resolves,
    /// releases the place in line.
    pub async fn acquire(&self, id: &SessionId) -> Result<SessionGuard<'_>> {
        let lock = {
            let mut slots = self.slots.lock();
            let slot = slots.entry(*id).or_default();
            if slot.users > self.max_pending {
                return Err(ServerError::Busy(format!(
                    "{} requests already queued for session {id}",
                    slot.users - 1
                )));
            }
            slot.users += 1;
            Arc::clone(&slot.lock)
        };

        let ticket = Ticket {
            serializer: self,
            id: *id,
        };
        let guard = lock.lock_owned().await;

        Ok(SessionGuard {
            _guard: guard,
            _ticket: ticket,
        })
    }

    /// Number of sessions with a holder or waiter.
    pub fn active(&self) -> usize {
        self.slots.lock().len()
    }

    fn release(&self, id: &SessionId) {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get_mut(id) {
            slot.users = slot.users.saturating_sub(1);
            if slot.users == 0 {
                slots.remove(id);
            }
        }
    }
}

/// Place in line for one session; releases the slot on drop.
struct Ticket<'a> {
    serializer: &'a SessionSerializer,
    id: SessionId,
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        self.serializer.release(&self.id);
    }
}

/// Exclusive access to one session until dropped.
pub struct SessionGuard<'a> {
    // Field order matters: the mutex is released before the slot count drops.
    _guard: OwnedMutexGuard<()>,
    _ticket: Ticket<'a>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_same_session_runs_in_arrival_order() {
        let serializer = Arc::new(SessionSerializer::new(16));
        let id = SessionId::generate(0);
        let log = Arc::new(Mutex::new(Vec::new()));

        let first = serializer.acquire(&id).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..4 {
            let serializer = Arc::clone(&serializer);
            let log = Arc::clone(&log);
            handles.push(tokio::spawn(async move {
                let _guard = serializer.acquire(&id).await.unwrap();
                log.lock().push(i);
                sleep(Duration::from_millis(5)).await;
            }));
            // Let each task reach the queue before spawning the next.
            sleep(Duration::from_millis(20)).await;
        }

        drop(first);
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*log.lock(), vec![0, 1, 2, 3]);
        assert_eq!(serializer.active(), 0);
    }

    #[tokio::test]
    async fn test_distinct_sessions_do_not_block() {
        let serializer = SessionSerializer::new(16);
        let a = SessionId::generate(0);
        let b = SessionId::generate(0);

        let _held = serializer.acquire(&a).await.unwrap();
        let other = tokio::time::timeout(Duration::from_millis(100), serializer.acquire(&b)).await;
        assert!(other.is_ok());
    }

    #[tokio::test]
    async fn test_queue_limit_returns_busy() {
        let serializer = Arc::new(SessionSerializer::new(1));
        let id = SessionId::generate(0);

        let held = serializer.acquire(&id).await.unwrap();

        let waiter = {
            let serializer = Arc::clone(&serializer);
            tokio::spawn(async move {
                let _guard = serializer.acquire(&id).await.unwrap();
            })
        };
        sleep(Duration::from_millis(20)).await;

        let result = serializer.acquire(&id).await;
        assert!(matches!(result, Err(ServerError::Busy(_))));

        drop(held);
        waiter.await.unwrap();
        assert_eq!(serializer.active(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_releases_slot() {
        let serializer = SessionSerializer::new(4);
        let id = SessionId::generate(0);

        let held = serializer.acquire(&id).await.unwrap();
        let timed_out =
            tokio::time::timeout(Duration::from_millis(20), serializer.acquire(&id)).await;
        assert!(timed_out.is_err());

        drop(held);
        assert_eq!(serializer.active(), 0);
    }
}
