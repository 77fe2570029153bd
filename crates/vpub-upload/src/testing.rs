//! Test doubles for the upload engine.
//!
//! [`ScriptedTransport`] answers each call from a per-operation script and
//! falls back to a well-behaved service once the script runs out. Every
//! chunk it receives is recorded so tests can check offsets.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use vpub_models::VideoMetadata;

use crate::credentials::CredentialProvider;
use crate::error::{UploadError, UploadResult};
use crate::sleeper::Sleeper;
use crate::transport::{ChunkStatus, SessionHandle, UploadTransport};

/// Scripted answer to a single transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Behave like a healthy service
    Accept,
    /// Report the service holding this many bytes
    Acknowledge(u64),
    /// Report completion with the given resource id
    Complete(Option<String>),
    /// Fail with an HTTP status
    Status(u16),
    /// Fail below the HTTP layer
    Disconnect,
}

/// One chunk as received by the double.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRecord {
    pub upload_url: String,
    pub offset: u64,
    pub len: usize,
}

/// One thumbnail call as received by the double.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailRecord {
    pub remote_id: String,
    pub len: usize,
    pub content_type: String,
}

#[derive(Default)]
struct ScriptState {
    session_attempts: u32,
    sessions: Vec<VideoMetadata>,
    held: HashMap<String, u64>,
    session_replies: VecDeque<Reply>,
    chunk_replies: VecDeque<Reply>,
    query_replies: VecDeque<Reply>,
    thumbnail_replies: VecDeque<Reply>,
    chunks: Vec<ChunkRecord>,
    queries: u32,
    thumbnails: Vec<ThumbnailRecord>,
}

/// Scripted [`UploadTransport`] that never touches the network.
#[derive(Default)]
pub struct ScriptedTransport {
    state: Mutex<ScriptState>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replies for `start_session`, consumed in order.
    pub fn with_session_replies(self, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.lock().session_replies.extend(replies);
        self
    }

    /// Replies for `send_chunk`, consumed in order.
    pub fn with_chunk_replies(self, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.lock().chunk_replies.extend(replies);
        self
    }

    /// Replies for `query_progress`, consumed in order.
    pub fn with_query_replies(self, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.lock().query_replies.extend(replies);
        self
    }

    /// Replies for `send_thumbnail`, consumed in order.
    pub fn with_thumbnail_replies(self, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.lock().thumbnail_replies.extend(replies);
        self
    }

    pub fn chunks(&self) -> Vec<ChunkRecord> {
        self.lock().chunks.clone()
    }

    pub fn session_attempts(&self) -> u32 {
        self.lock().session_attempts
    }

    /// Titles of the sessions that were successfully created.
    pub fn session_titles(&self) -> Vec<String> {
        self.lock().sessions.iter().map(|m| m.title.clone()).collect()
    }

    pub fn queries(&self) -> u32 {
        self.lock().queries
    }

    pub fn thumbnails(&self) -> Vec<ThumbnailRecord> {
        self.lock().thumbnails.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn failure(reply: &Reply, operation: &str) -> Option<UploadError> {
        match reply {
            Reply::Status(status) => Some(UploadError::from_http_status(
                *status,
                operation,
                "scripted failure",
            )),
            Reply::Disconnect => Some(UploadError::connection("connection reset by peer")),
            _ => None,
        }
    }

    fn remote_id_for(upload_url: &str) -> String {
        let session = upload_url.rsplit('/').next().unwrap_or("0");
        format!("video-{}", session)
    }

    fn progress(held: u64, total_bytes: u64, upload_url: &str) -> ChunkStatus {
        if held >= total_bytes {
            ChunkStatus::Complete {
                remote_id: Some(Self::remote_id_for(upload_url)),
                body: "{}".to_string(),
            }
        } else {
            ChunkStatus::Incomplete { acknowledged: held }
        }
    }
}

#[async_trait]
impl UploadTransport for ScriptedTransport {
    async fn start_session(
        &self,
        metadata: &VideoMetadata,
        _total_bytes: u64,
        _content_type: &str,
    ) -> UploadResult<SessionHandle> {
        let mut state = self.lock();
        state.session_attempts += 1;
        let reply = state.session_replies.pop_front().unwrap_or(Reply::Accept);
        if let Some(err) = Self::failure(&reply, "start_session") {
            return Err(err);
        }

        state.sessions.push(metadata.clone());
        let upload_url = format!("scripted://sessions/{}", state.sessions.len());
        state.held.insert(upload_url.clone(), 0);
        Ok(SessionHandle { upload_url })
    }

    async fn send_chunk(
        &self,
        session: &SessionHandle,
        offset: u64,
        chunk: Vec<u8>,
        total_bytes: u64,
    ) -> UploadResult<ChunkStatus> {
        let mut state = self.lock();
        state.chunks.push(ChunkRecord {
            upload_url: session.upload_url.clone(),
            offset,
            len: chunk.len(),
        });

        let reply = state.chunk_replies.pop_front().unwrap_or(Reply::Accept);
        if let Some(err) = Self::failure(&reply, "send_chunk") {
            return Err(err);
        }

        match reply {
            Reply::Acknowledge(held) => {
                state.held.insert(session.upload_url.clone(), held);
                Ok(ChunkStatus::Incomplete { acknowledged: held })
            }
            Reply::Complete(remote_id) => Ok(ChunkStatus::Complete {
                remote_id,
                body: "{\"kind\":\"video\"}".to_string(),
            }),
            _ => {
                let held = offset + chunk.len() as u64;
                state.held.insert(session.upload_url.clone(), held);
                Ok(Self::progress(held, total_bytes, &session.upload_url))
            }
        }
    }

    async fn query_progress(
        &self,
        session: &SessionHandle,
        total_bytes: u64,
    ) -> UploadResult<ChunkStatus> {
        let mut state = self.lock();
        state.queries += 1;

        let reply = state.query_replies.pop_front().unwrap_or(Reply::Accept);
        if let Some(err) = Self::failure(&reply, "query_progress") {
            return Err(err);
        }

        match reply {
            Reply::Acknowledge(held) => {
                state.held.insert(session.upload_url.clone(), held);
                Ok(ChunkStatus::Incomplete { acknowledged: held })
            }
            Reply::Complete(remote_id) => Ok(ChunkStatus::Complete {
                remote_id,
                body: "{}".to_string(),
            }),
            _ => {
                let held = state.held.get(&session.upload_url).copied().unwrap_or(0);
                Ok(Self::progress(held, total_bytes, &session.upload_url))
            }
        }
    }

    async fn send_thumbnail(
        &self,
        remote_id: &str,
        image: Vec<u8>,
        content_type: &str,
    ) -> UploadResult<()> {
        let mut state = self.lock();
        state.thumbnails.push(ThumbnailRecord {
            remote_id: remote_id.to_string(),
            len: image.len(),
            content_type: content_type.to_string(),
        });

        let reply = state.thumbnail_replies.pop_front().unwrap_or(Reply::Accept);
        match Self::failure(&reply, "send_thumbnail") {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// [`Sleeper`] that records requested waits and returns immediately.
#[derive(Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn durations(&self) -> Vec<Duration> {
        self.slept.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn total(&self) -> Duration {
        self.durations().iter().sum()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(duration);
    }
}

/// [`CredentialProvider`] returning a fixed token.
pub struct StaticCredentials {
    token: String,
    invalidations: AtomicU32,
}

impl StaticCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            invalidations: AtomicU32::new(0),
        }
    }

    pub fn invalidations(&self) -> u32 {
        self.invalidations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn access_token(&self) -> UploadResult<String> {
        Ok(self.token.clone())
    }

    async fn invalidate(&self) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
    }
}
