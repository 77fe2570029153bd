//! Resumable upload session.
//!
//! Drives an [`UploadTransport`] chunk by chunk until the service reports the
//! created resource id. Transient failures are absorbed locally: the session
//! waits per its [`BackoffPolicy`](crate::backoff::BackoffPolicy), asks the
//! service how many bytes it holds, and resumes from there. Anything else
//! ends the session in `FatalFailed`.
//!
//! ```text
//! Initialized -> Uploading <-> Retrying -> Completed
//!                    \-----------------------> FatalFailed
//! ```

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use vpub_models::VideoMetadata;

use crate::config::UploadConfig;
use crate::error::{ErrorKind, UploadError, UploadResult};
use crate::metrics::{record_acknowledged, record_chunk, record_retry, record_session};
use crate::sleeper::Sleeper;
use crate::transport::{content_type_for, ChunkStatus, SessionHandle, UploadTransport};

/// Lifecycle of an upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadState {
    Initialized,
    Uploading,
    Retrying,
    Completed,
    FatalFailed,
}

impl UploadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadState::Completed | UploadState::FatalFailed)
    }
}

/// Transfers one local file as a single remote resource.
///
/// A session is owned by one job for its whole lifetime and is not
/// reusable: once `Completed`, `run` returns the cached id without
/// uploading again; once `FatalFailed`, `run` is rejected.
pub struct ResumableUploadSession<'a, T: UploadTransport + ?Sized> {
    transport: &'a T,
    sleeper: &'a dyn Sleeper,
    config: &'a UploadConfig,
    local_file: PathBuf,
    metadata: VideoMetadata,
    content_type: &'static str,
    total_bytes: u64,
    bytes_acknowledged: u64,
    handle: Option<SessionHandle>,
    remote_id: Option<String>,
    state: UploadState,
    retry_count: u32,
    last_error: Option<ErrorKind>,
    resync: bool,
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl<'a, T: UploadTransport + ?Sized> ResumableUploadSession<'a, T> {
    pub fn new(
        transport: &'a T,
        sleeper: &'a dyn Sleeper,
        config: &'a UploadConfig,
        local_file: impl AsRef<Path>,
        metadata: VideoMetadata,
    ) -> Self {
        let local_file = local_file.as_ref().to_path_buf();
        let content_type = content_type_for(&local_file);

        Self {
            transport,
            sleeper,
            config,
            local_file,
            metadata,
            content_type,
            total_bytes: 0,
            bytes_acknowledged: 0,
            handle: None,
            remote_id: None,
            state: UploadState::Initialized,
            retry_count: 0,
            last_error: None,
            resync: false,
            cancel_rx: None,
        }
    }

    /// Stop after the next acknowledged chunk once the flag turns true.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    pub fn local_file(&self) -> &Path {
        &self.local_file
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn bytes_acknowledged(&self) -> u64 {
        self.bytes_acknowledged
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn last_error(&self) -> Option<ErrorKind> {
        self.last_error
    }

    pub fn remote_id(&self) -> Option<&str> {
        self.remote_id.as_deref()
    }

    /// Upload the file and return the remote resource id.
    pub async fn run(&mut self) -> UploadResult<String> {
        match (self.state, &self.remote_id) {
            (UploadState::Completed, Some(remote_id)) => {
                debug!(remote_id = %remote_id, "Session already completed, not uploading again");
                return Ok(remote_id.clone());
            }
            (UploadState::FatalFailed, _) => {
                return Err(UploadError::SessionTerminated(
                    self.last_error.unwrap_or(ErrorKind::SessionTerminated),
                ));
            }
            _ => {}
        }

        match self.drive().await {
            Ok(remote_id) => {
                self.state = UploadState::Completed;
                self.remote_id = Some(remote_id.clone());
                record_session("completed");
                info!(
                    path = %self.local_file.display(),
                    remote_id = %remote_id,
                    retries = self.retry_count,
                    "Video id \"{}\" was successfully uploaded", remote_id
                );
                Ok(remote_id)
            }
            Err(e) => {
                let kind = e.kind_with(&self.config.retriable_statuses);
                self.state = UploadState::FatalFailed;
                self.last_error = Some(kind);
                record_session(kind.as_str());
                error!(
                    path = %self.local_file.display(),
                    kind = %kind,
                    bytes_acknowledged = self.bytes_acknowledged,
                    retries = self.retry_count,
                    "Upload failed: {}", e
                );
                Err(e)
            }
        }
    }

    async fn drive(&mut self) -> UploadResult<String> {
        if self.state == UploadState::Initialized {
            self.prepare().await?;
        }

        let mut file = File::open(&self.local_file).await?;

        loop {
            match self.step(&mut file).await {
                Ok(Some(remote_id)) => return Ok(remote_id),
                Ok(None) => self.check_cancelled()?,
                Err(e) if self.config.is_retriable(&e) => self.backoff(e).await?,
                Err(e) => return Err(e),
            }
        }
    }

    async fn prepare(&mut self) -> UploadResult<()> {
        self.metadata
            .validate()
            .map_err(|e| UploadError::invalid_input(e.to_string()))?;

        let meta = tokio::fs::metadata(&self.local_file).await.map_err(|e| {
            UploadError::invalid_input(format!("{}: {}", self.local_file.display(), e))
        })?;

        if !meta.is_file() {
            return Err(UploadError::invalid_input(format!(
                "{} is not a regular file",
                self.local_file.display()
            )));
        }

        if meta.len() == 0 {
            return Err(UploadError::invalid_input(format!(
                "{} is empty",
                self.local_file.display()
            )));
        }

        self.total_bytes = meta.len();
        self.state = UploadState::Uploading;
        Ok(())
    }

    /// Perform one exchange with the service.
    ///
    /// Returns the remote id once the transfer completes.
    async fn step(&mut self, file: &mut File) -> UploadResult<Option<String>> {
        let handle = match &self.handle {
            Some(handle) => handle.clone(),
            None => {
                info!(path = %self.local_file.display(), total_bytes = self.total_bytes, "Uploading file...");
                let handle = self
                    .transport
                    .start_session(&self.metadata, self.total_bytes, self.content_type)
                    .await?;
                debug!(upload_url = %handle.upload_url, "Resumable session created");
                self.handle = Some(handle.clone());
                handle
            }
        };

        let status = if self.resync {
            let status = self
                .transport
                .query_progress(&handle, self.total_bytes)
                .await?;
            self.resync = false;
            status
        } else {
            let offset = self.bytes_acknowledged;
            let chunk = self.read_chunk(file, offset).await?;
            let len = chunk.len();
            record_chunk(len);

            let status = self
                .transport
                .send_chunk(&handle, offset, chunk, self.total_bytes)
                .await?;

            if status == (ChunkStatus::Incomplete { acknowledged: offset }) {
                return Err(UploadError::connection(format!(
                    "chunk at offset {} ({} bytes) was not acknowledged",
                    offset, len
                )));
            }
            status
        };

        match status {
            ChunkStatus::Incomplete { acknowledged } => {
                self.acknowledge(acknowledged)?;
                Ok(None)
            }
            ChunkStatus::Complete {
                remote_id: Some(remote_id),
                ..
            } if !remote_id.is_empty() => {
                record_acknowledged(self.total_bytes - self.bytes_acknowledged);
                self.bytes_acknowledged = self.total_bytes;
                Ok(Some(remote_id))
            }
            ChunkStatus::Complete { body, .. } => Err(UploadError::unexpected_response(body)),
        }
    }

    fn acknowledge(&mut self, acknowledged: u64) -> UploadResult<()> {
        if acknowledged < self.bytes_acknowledged {
            return Err(UploadError::unexpected_response(format!(
                "service reports {} bytes, below the {} already acknowledged",
                acknowledged, self.bytes_acknowledged
            )));
        }

        if acknowledged >= self.total_bytes {
            return Err(UploadError::unexpected_response(format!(
                "service holds {} of {} bytes but did not complete the upload",
                acknowledged, self.total_bytes
            )));
        }

        record_acknowledged(acknowledged - self.bytes_acknowledged);
        self.bytes_acknowledged = acknowledged;
        debug!(
            bytes_acknowledged = self.bytes_acknowledged,
            total_bytes = self.total_bytes,
            "Upload progress"
        );
        Ok(())
    }

    async fn read_chunk(&self, file: &mut File, offset: u64) -> UploadResult<Vec<u8>> {
        let len = self.config.chunk_size.min(self.total_bytes - offset) as usize;
        file.seek(SeekFrom::Start(offset)).await?;

        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf).await?;
        Ok(buf)
    }

    async fn backoff(&mut self, error: UploadError) -> UploadResult<()> {
        let kind = error.kind_with(&self.config.retriable_statuses);
        self.last_error = Some(kind);

        if self.retry_count >= self.config.max_retries {
            warn!(
                retries = self.retry_count,
                "No longer attempting to retry: {}", error
            );
            return Err(UploadError::RetryBudgetExhausted {
                retries: self.retry_count,
                last_error: error.to_string(),
            });
        }

        self.state = UploadState::Retrying;
        self.retry_count += 1;
        let delay = self.config.backoff.next_delay(self.retry_count);

        warn!(
            retry = self.retry_count,
            max_retries = self.config.max_retries,
            kind = %kind,
            delay_ms = delay.as_millis() as u64,
            "A retriable error occurred: {}. Sleeping {:.3} seconds and then retrying...",
            error,
            delay.as_secs_f64()
        );
        record_retry(kind.as_str(), delay.as_secs_f64());

        self.sleeper.sleep(delay).await;

        // The service may hold more (or fewer) bytes than the last reply said
        if self.handle.is_some() {
            self.resync = true;
        }
        self.state = UploadState::Uploading;
        Ok(())
    }

    fn check_cancelled(&self) -> UploadResult<()> {
        if let Some(ref cancel_rx) = self.cancel_rx {
            if *cancel_rx.borrow() {
                info!(
                    bytes_acknowledged = self.bytes_acknowledged,
                    "Upload cancelled between chunks"
                );
                return Err(UploadError::Cancelled);
            }
        }
        Ok(())
    }
}
