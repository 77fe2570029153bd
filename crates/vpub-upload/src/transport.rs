//! Capability interface over the hosting service.
//!
//! The upload engine only needs four calls: open a resumable session, send
//! the next chunk, ask the service how far it got, and send a thumbnail.
//! Production uses [`crate::youtube::YouTubeTransport`]; tests use the
//! scripted double in [`crate::testing`].

use std::path::Path;

use async_trait::async_trait;
use vpub_models::VideoMetadata;

use crate::error::UploadResult;

/// Handle to a server-side resumable upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    /// URL the chunks are sent to
    pub upload_url: String,
}

/// Service reply to a chunk send or progress query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkStatus {
    /// Transfer still in progress; the service holds `acknowledged` bytes
    Incomplete { acknowledged: u64 },
    /// Transfer finished; `remote_id` is the created resource, if reported
    Complete {
        remote_id: Option<String>,
        body: String,
    },
}

/// Operations the upload engine needs from the remote service.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// Create a resumable upload session for a file of `total_bytes`.
    async fn start_session(
        &self,
        metadata: &VideoMetadata,
        total_bytes: u64,
        content_type: &str,
    ) -> UploadResult<SessionHandle>;

    /// Send `chunk` starting at byte `offset`.
    async fn send_chunk(
        &self,
        session: &SessionHandle,
        offset: u64,
        chunk: Vec<u8>,
        total_bytes: u64,
    ) -> UploadResult<ChunkStatus>;

    /// Ask the service how many bytes it holds for the session.
    async fn query_progress(
        &self,
        session: &SessionHandle,
        total_bytes: u64,
    ) -> UploadResult<ChunkStatus>;

    /// Attach a small image to an existing resource in one request.
    async fn send_thumbnail(
        &self,
        remote_id: &str,
        image: Vec<u8>,
        content_type: &str,
    ) -> UploadResult<()>;
}

/// Guess a MIME type from a file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("mp4") | Some("m4v") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}
