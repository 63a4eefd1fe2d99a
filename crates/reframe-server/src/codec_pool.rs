//! Bounded pool for CPU-bound codec work.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::error::{Result, ServerError};

/// Runs blocking closures on tokio's blocking threads, at most `size` at a
/// time.
///
/// The permit moves into the blocking closure, so a request that is
/// cancelled while its job runs still holds the slot until the job ends.
#[derive(Clone)]
pub struct CodecPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl CodecPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Permits not currently in use.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `job` once a permit is free.
    pub async fn run<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| ServerError::ServiceUnavailable("codec pool is closed".to_string()))?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
        .await
        .map_err(|e| ServerError::Processing(format!("codec task failed: {e}")))
    }
}
