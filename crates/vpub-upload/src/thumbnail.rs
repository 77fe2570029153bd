//! Single-shot thumbnail upload.
//!
//! Best effort: one request, no retry. A failure is reported to the caller
//! and never rolls back the video it belongs to.

use std::path::Path;

use tracing::{info, warn};

use crate::error::{UploadError, UploadResult};
use crate::metrics::record_thumbnail;
use crate::session::{ResumableUploadSession, UploadState};
use crate::transport::{content_type_for, UploadTransport};

/// Largest thumbnail the service accepts (2 MiB).
pub const MAX_THUMBNAIL_BYTES: usize = 2 * 1024 * 1024;

/// Attaches a custom thumbnail to an uploaded video.
pub struct ThumbnailUploader<'a, T: UploadTransport + ?Sized> {
    transport: &'a T,
}

impl<'a, T: UploadTransport + ?Sized> ThumbnailUploader<'a, T> {
    pub fn new(transport: &'a T) -> Self {
        Self { transport }
    }

    /// Set the thumbnail for the video produced by a completed session.
    pub async fn set_for_session<U: UploadTransport + ?Sized>(
        &self,
        session: &ResumableUploadSession<'_, U>,
        image_path: impl AsRef<Path>,
    ) -> UploadResult<()> {
        match (session.state(), session.remote_id()) {
            (UploadState::Completed, Some(remote_id)) => self.set(remote_id, image_path).await,
            (state, _) => Err(UploadError::invalid_input(format!(
                "thumbnail requires a completed upload, session is {:?}",
                state
            ))),
        }
    }

    /// Set the thumbnail for `remote_id` from a local image.
    pub async fn set(&self, remote_id: &str, image_path: impl AsRef<Path>) -> UploadResult<()> {
        let image_path = image_path.as_ref();
        let result = self.send(remote_id, image_path).await;

        record_thumbnail(result.is_ok());
        match &result {
            Ok(()) => info!(remote_id = %remote_id, "The custom thumbnail was successfully set"),
            Err(e) => warn!(
                remote_id = %remote_id,
                path = %image_path.display(),
                "Thumbnail upload failed: {}", e
            ),
        }
        result
    }

    async fn send(&self, remote_id: &str, image_path: &Path) -> UploadResult<()> {
        if remote_id.is_empty() {
            return Err(UploadError::invalid_input("remote id is empty"));
        }

        let image = tokio::fs::read(image_path).await.map_err(|e| {
            UploadError::invalid_input(format!("{}: {}", image_path.display(), e))
        })?;

        if image.is_empty() {
            return Err(UploadError::invalid_input(format!(
                "{} is empty",
                image_path.display()
            )));
        }

        if image.len() > MAX_THUMBNAIL_BYTES {
            return Err(UploadError::invalid_input(format!(
                "{} is {} bytes, limit is {}",
                image_path.display(),
                image.len(),
                MAX_THUMBNAIL_BYTES
            )));
        }

        self.transport
            .send_thumbnail(remote_id, image, content_type_for(image_path))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::BackoffPolicy;
    use crate::config::UploadConfig;
    use crate::error::ErrorKind;
    use crate::testing::{RecordingSleeper, Reply, ScriptedTransport};
    use tempfile::TempDir;
    use vpub_models::{Privacy, VideoMetadata};

    fn write(dir: &TempDir, name: &str, size: usize) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, vec![1u8; size]).unwrap();
        path
    }

    fn metadata() -> VideoMetadata {
        VideoMetadata {
            title: "Thumb test".to_string(),
            description: String::new(),
            tags: Vec::new(),
            category_id: "22".to_string(),
            privacy: Privacy::Unlisted,
        }
    }

    #[tokio::test]
    async fn test_set_sends_one_request() {
        let dir = TempDir::new().unwrap();
        let image = write(&dir, "thumbnail.jpg", 2048);
        let transport = ScriptedTransport::new();

        ThumbnailUploader::new(&transport).set("video-9", &image).await.unwrap();

        let calls = transport.thumbnails();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].remote_id, "video-9");
        assert_eq!(calls[0].len, 2048);
        assert_eq!(calls[0].content_type, "image/jpeg");
    }

    #[tokio::test]
    async fn test_failure_is_not_retried() {
        let dir = TempDir::new().unwrap();
        let image = write(&dir, "thumbnail.jpg", 10);
        let transport = ScriptedTransport::new().with_thumbnail_replies(vec![Reply::Status(503)]);

        let err = ThumbnailUploader::new(&transport)
            .set("video-1", &image)
            .await
            .unwrap_err();

        assert_eq!(err.http_status(), Some(503));
        assert_eq!(transport.thumbnails().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_image_rejected() {
        let dir = TempDir::new().unwrap();
        let transport = ScriptedTransport::new();

        let err = ThumbnailUploader::new(&transport)
            .set("video-1", dir.path().join("nope.jpg"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(transport.thumbnails().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_image_rejected() {
        let dir = TempDir::new().unwrap();
        let image = write(&dir, "thumbnail.png", MAX_THUMBNAIL_BYTES + 1);
        let transport = ScriptedTransport::new();

        let err = ThumbnailUploader::new(&transport)
            .set("video-1", &image)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_requires_completed_session() {
        let dir = TempDir::new().unwrap();
        let video = write(&dir, "output.mp4", 1000);
        let image = write(&dir, "thumbnail.jpg", 10);
        let transport = ScriptedTransport::new();
        let sleeper = RecordingSleeper::new();
        let config = UploadConfig::default().with_backoff(BackoffPolicy::immediate());
        let uploader = ThumbnailUploader::new(&transport);

        let mut session =
            ResumableUploadSession::new(&transport, &sleeper, &config, &video, metadata());
        assert!(uploader.set_for_session(&session, &image).await.is_err());

        let remote_id = session.run().await.unwrap();
        uploader.set_for_session(&session, &image).await.unwrap();

        assert_eq!(transport.thumbnails().len(), 1);
        assert_eq!(transport.thumbnails()[0].remote_id, remote_id);
    }
}
