//! Session factory
//!
//! A [`Recorder`] is shared by the transport for all connections. It hands
//! out sessions with unique ids, enforces the session limit, and decides how
//! the frame transform is wired into each session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, OwnedSemaphorePermit, Semaphore};

use crate::error::{Result, SessionError};
use crate::server::config::RecorderConfig;
use crate::server::handler::IngestHandler;
use crate::session::{ConnectInfo, Session};
use crate::transform::{Deadline, FrameTransform, KeyframeStage, RasterPipeline};

/// Creates recording sessions
pub struct Recorder {
    config: Arc<RecorderConfig>,
    transform: Arc<dyn FrameTransform>,
    next_session_id: AtomicU64,
    session_semaphore: Option<Arc<Semaphore>>,
}

impl Recorder {
    /// Create a recorder with the default (pass-through) raster pipeline
    pub fn new(config: RecorderConfig) -> Self {
        Self::with_transform(config, Arc::new(RasterPipeline::passthrough()))
    }

    /// Create a recorder that routes key frames through `transform`
    pub fn with_transform(config: RecorderConfig, transform: Arc<dyn FrameTransform>) -> Self {
        let session_semaphore = if config.max_sessions > 0 {
            Some(Arc::new(Semaphore::new(config.max_sessions)))
        } else {
            None
        };

        Self {
            config: Arc::new(config),
            transform,
            next_session_id: AtomicU64::new(1),
            session_semaphore,
        }
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Create a session driven synchronously by the caller
    pub fn session(&self) -> Result<Session> {
        let permit = self.acquire_permit()?;
        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(session_id = session_id, "New session");

        let session = Session::new(session_id, Arc::clone(&self.config), self.stage());
        Ok(match permit {
            Some(permit) => session.with_permit(permit),
            None => session,
        })
    }

    /// Create a session running on its own worker thread
    ///
    /// Each session gets a dedicated OS thread, so a slow or stuck session
    /// never delays another one. The handle works from any async runtime.
    pub fn spawn_session(&self) -> Result<SessionHandle> {
        let session = self.session()?;
        SessionHandle::spawn(session, self.config.queue_depth)
    }

    fn stage(&self) -> KeyframeStage {
        if !self.config.transform_enabled {
            return KeyframeStage::disabled();
        }

        match self.config.transform_timeout {
            Some(timeout) => KeyframeStage::new(Arc::new(Deadline::new(
                Arc::clone(&self.transform),
                timeout,
            ))),
            None => KeyframeStage::new(Arc::clone(&self.transform)),
        }
    }

    fn acquire_permit(&self) -> Result<Option<OwnedSemaphorePermit>> {
        let Some(ref sem) = self.session_semaphore else {
            return Ok(None);
        };

        match sem.clone().try_acquire_owned() {
            Ok(permit) => Ok(Some(permit)),
            Err(_) => {
                tracing::warn!(
                    max_sessions = self.config.max_sessions,
                    "Session rejected: limit reached"
                );
                Err(SessionError::LimitReached.into())
            }
        }
    }
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("config", &self.config)
            .field("next_session_id", &self.next_session_id)
            .finish()
    }
}

enum Command {
    Connect(ConnectInfo),
    CreateStream,
    Publish(String),
    Metadata(u32, Bytes),
    Audio(u32, Bytes),
    Video(u32, Bytes),
    Close,
}

struct Request {
    command: Command,
    reply: oneshot::Sender<Result<()>>,
}

/// Async front for a session running on its own thread
///
/// Callbacks are queued and applied one at a time in the order they were
/// sent, so clones of the handle may be used from several tasks. Dropping
/// every handle closes the session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: u64,
    tx: mpsc::Sender<Request>,
}

impl SessionHandle {
    fn spawn(session: Session, queue_depth: usize) -> Result<Self> {
        let id = session.id();
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        // On failure the closure, and with it the session and its permit, is dropped
        thread::Builder::new()
            .name(format!("flv-session-{}", id))
            .spawn(move || run_session(session, rx))?;
        Ok(Self { id, tx })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn on_connect(&self, info: ConnectInfo) -> Result<()> {
        self.call(Command::Connect(info)).await
    }

    pub async fn on_create_stream(&self) -> Result<()> {
        self.call(Command::CreateStream).await
    }

    pub async fn on_publish(&self, stream_name: impl Into<String>) -> Result<()> {
        self.call(Command::Publish(stream_name.into())).await
    }

    pub async fn on_metadata(&self, timestamp: u32, payload: Bytes) -> Result<()> {
        self.call(Command::Metadata(timestamp, payload)).await
    }

    pub async fn on_audio(&self, timestamp: u32, payload: Bytes) -> Result<()> {
        self.call(Command::Audio(timestamp, payload)).await
    }

    pub async fn on_video(&self, timestamp: u32, payload: Bytes) -> Result<()> {
        self.call(Command::Video(timestamp, payload)).await
    }

    /// Close the session; returns once the recording is flushed
    pub async fn on_close(&self) -> Result<()> {
        self.call(Command::Close).await
    }

    async fn call(&self, command: Command) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Request { command, reply })
            .await
            .map_err(|_| SessionError::Closed)?;
        response.await.map_err(|_| SessionError::Closed)?
    }
}

fn run_session(mut session: Session, mut rx: mpsc::Receiver<Request>) {
    while let Some(Request { command, reply }) = rx.blocking_recv() {
        let result = match command {
            Command::Connect(info) => session.on_connect(&info),
            Command::CreateStream => session.on_create_stream(),
            Command::Publish(name) => session.on_publish(&name),
            Command::Metadata(ts, payload) => session.on_metadata(ts, payload),
            Command::Audio(ts, payload) => session.on_audio(ts, payload),
            Command::Video(ts, payload) => session.on_video(ts, payload),
            Command::Close => {
                let result = session.on_close();
                let session_id = session.id();
                // Release the session (and its limit permit) before replying
                drop(session);
                let _ = reply.send(result);
                tracing::debug!(session_id = session_id, "Session worker finished");
                return;
            }
        };
        let _ = reply.send(result);
    }
    tracing::debug!(session_id = session.id(), "All handles dropped, closing session");
}
