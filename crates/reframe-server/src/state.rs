//! Application state shared across handlers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use bytes::Bytes;
use reframe_image::{ImageFormat, Operation, TransformOutput, TransformPipeline};
use reframe_session::{
    EvictionHook, EvictionReason, ImageState, Session, SessionCache, SessionId,
};
use tracing::{debug, info};

use crate::codec_pool::CodecPool;
use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::serializer::SessionSerializer;

#[derive(Debug, Default)]
struct EvictionCounts {
    capacity: AtomicU64,
    bytes: AtomicU64,
    expired: AtomicU64,
}

impl EvictionCounts {
    fn counter(&self, reason: EvictionReason) -> &AtomicU64 {
        match reason {
            EvictionReason::Capacity => &self.capacity,
            EvictionReason::Bytes => &self.bytes,
            EvictionReason::Expired => &self.expired,
        }
    }
}

/// Logs every session the store drops and counts them per reason.
#[derive(Debug, Clone, Default)]
pub struct EvictionLog {
    worker: u16,
    counts: Arc<EvictionCounts>,
}

impl EvictionLog {
    pub fn new(worker: u16) -> Self {
        Self {
            worker,
            counts: Arc::default(),
        }
    }

    pub fn count(&self, reason: EvictionReason) -> u64 {
        self.counts.counter(reason).load(Ordering::Relaxed)
    }
}

impl EvictionHook for EvictionLog {
    fn on_evict(&self, id: &SessionId, reason: EvictionReason, size_bytes: usize) {
        self.counts.counter(reason).fetch_add(1, Ordering::Relaxed);
        info!(
            session_id = %id,
            worker = self.worker,
            %reason,
            size_bytes,
            "Session evicted"
        );
    }
}

/// Session store type used by the server.
pub type SessionStore = SessionCache<EvictionLog>;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,

    pub sessions: SessionStore,

    pub evictions: EvictionLog,

    pub serializer: Arc<SessionSerializer>,

    pub codec: CodecPool,

    pub pipeline: TransformPipeline,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let evictions = EvictionLog::new(config.worker_index);
        let cache = config.cache.clone().with_worker(config.worker_index);
        Self {
            sessions: SessionCache::with_hook(cache, evictions.clone()),
            evictions,
            serializer: Arc::new(SessionSerializer::new(config.max_pending_per_session)),
            codec: CodecPool::new(config.codec_threads),
            pipeline: TransformPipeline::new(config.limits),
            config: Arc::new(config),
        }
    }

    pub fn worker_index(&self) -> u16 {
        self.config.worker_index
    }

    /// Apply `op` to a fresh upload and register the result as a new session.
    pub async fn create_session(
        &self,
        upload: Bytes,
        original_name: Option<String>,
        op: Operation,
    ) -> Result<Session> {
        let started = Instant::now();

        let work = async {
            let output = self.run_pipeline(upload, op).await?;
            let session = self
                .sessions
                .create(to_image_state(output), original_name)
                .await?;
            Ok::<_, ServerError>(session)
        };
        let session = self.with_deadline(work).await?;

        info!(
            session_id = %session.id,
            worker = self.worker_index(),
            op = op.name(),
            width = session.image.width,
            height = session.image.height,
            duration_ms = started.elapsed().as_millis() as u64,
            "Session created"
        );
        Ok(session)
    }

    /// Apply `op` to the current image of an existing session.
    ///
    /// Runs inside the session's critical section; the new image is swapped
    /// in only after the whole pipeline succeeded, so failures and timeouts
    /// leave the previous image in place.
    pub async fn transform_session(&self, raw_id: &str, op: Operation) -> Result<Session> {
        let id: SessionId = raw_id.parse()?;
        let started = Instant::now();

        let work = async {
            let _guard = self.serializer.acquire(&id).await?;
            let current = self.sessions.get(&id).await?;
            debug!(session_id = %id, revision = current.revision, op = op.name(), "Applying transform");

            let output = self.run_pipeline(current.image.data, op).await?;
            let session = self.sessions.replace(&id, to_image_state(output)).await?;
            Ok::<_, ServerError>(session)
        };
        let session = self.with_deadline(work).await?;

        info!(
            session_id = %id,
            worker = self.worker_index(),
            op = op.name(),
            revision = session.revision,
            width = session.image.width,
            height = session.image.height,
            duration_ms = started.elapsed().as_millis() as u64,
            "Transform applied"
        );
        Ok(session)
    }

    /// Read a session without refreshing it.
    pub async fn peek_session(&self, raw_id: &str) -> Result<Session> {
        let id: SessionId = raw_id.parse()?;
        Ok(self.sessions.peek(&id).await?)
    }

    async fn run_pipeline(&self, input: Bytes, op: Operation) -> Result<TransformOutput> {
        let pipeline = self.pipeline;
        let output = self.codec.run(move || pipeline.run(&input, &op)).await??;
        Ok(output)
    }

    async fn with_deadline<T>(&self, work: impl Future<Output = Result<T>>) -> Result<T> {
        let deadline = self.config.request_timeout;
        tokio::time::timeout(deadline, work)
            .await
            .map_err(|_| ServerError::ProcessingTimeout(deadline.as_millis() as u64))?
    }
}

fn to_image_state(output: TransformOutput) -> ImageState {
    ImageState::new(output.bytes, output.format, output.width, output.height)
}

/// Reject uploads that are not a supported image before any codec work.
pub fn sniff_upload(data: &[u8]) -> Result<ImageFormat> {
    if data.is_empty() {
        return Err(ServerError::InvalidParams("uploaded file is empty".to_string()));
    }
    ImageFormat::detect(data)
        .map_err(|_| ServerError::InvalidParams("uploaded file is not a supported image".to_string()))
}
