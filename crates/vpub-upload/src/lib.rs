//! Resumable upload engine for the video hosting service.
//!
//! This crate provides:
//! - Chunked resumable uploads with randomized exponential backoff
//! - Failure classification shared with batch outcomes
//! - Single-shot thumbnail upload
//! - Stored refresh-token credentials with console authorization
//! - An HTTPS transport behind the [`UploadTransport`] capability

pub mod backoff;
pub mod config;
pub mod credentials;
pub mod error;
pub mod metrics;
pub mod session;
pub mod sleeper;
pub mod thumbnail;
pub mod transport;
pub mod youtube;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use backoff::BackoffPolicy;
pub use config::{CredentialConfig, UploadConfig, UPLOAD_SCOPE};
pub use credentials::{establish_credentials, CredentialProvider, RefreshTokenProvider};
pub use error::{ErrorKind, UploadError, UploadResult};
pub use session::{ResumableUploadSession, UploadState};
pub use sleeper::{Sleeper, TokioSleeper};
pub use thumbnail::ThumbnailUploader;
pub use transport::{ChunkStatus, SessionHandle, UploadTransport};
pub use youtube::{build_http_client, YouTubeTransport};
