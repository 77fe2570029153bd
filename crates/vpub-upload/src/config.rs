//! Upload and credential configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::backoff::BackoffPolicy;
use crate::error::UploadError;

/// Maximum number of retries per upload session.
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// HTTP statuses that are retried with backoff.
pub const DEFAULT_RETRIABLE_STATUSES: [u16; 4] = [500, 502, 503, 504];

/// Chunk sizes must be a multiple of this (except the final chunk).
pub const CHUNK_ALIGNMENT: u64 = 256 * 1024;

/// Default chunk size (8 MiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 32 * CHUNK_ALIGNMENT;

/// Default service host.
pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";

/// Scope that allows uploads to the authenticated channel and nothing else.
pub const UPLOAD_SCOPE: &str = "https://www.googleapis.com/auth/youtube.upload";

/// Upload engine configuration.
///
/// Built once and shared read-only by every session of a batch.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Retry cap per session
    pub max_retries: u32,
    /// HTTP statuses treated as transient
    pub retriable_statuses: Vec<u16>,
    /// Bytes sent per chunk request
    pub chunk_size: u64,
    /// Backoff applied between retries
    pub backoff: BackoffPolicy,
    /// Service host, e.g. https://www.googleapis.com
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retriable_statuses: DEFAULT_RETRIABLE_STATUSES.to_vec(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            backoff: BackoffPolicy::default(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(600),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl UploadConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let chunk_size = std::env::var("VPUB_CHUNK_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(align_chunk_size)
            .unwrap_or(defaults.chunk_size);

        Self {
            max_retries: std::env::var("VPUB_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            chunk_size,
            base_url: std::env::var("VPUB_BASE_URL").unwrap_or(defaults.base_url),
            timeout: Duration::from_secs(
                std::env::var("VPUB_UPLOAD_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
            connect_timeout: Duration::from_secs(
                std::env::var("VPUB_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
            ..defaults
        }
    }

    /// Set the retry cap.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the chunk size, rounded to the service alignment.
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = align_chunk_size(chunk_size);
        self
    }

    /// Set the backoff policy.
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the service host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Whether this configuration retries the given error.
    pub fn is_retriable(&self, error: &UploadError) -> bool {
        error.kind_with(&self.retriable_statuses).is_retriable()
    }
}

/// Round a chunk size down to a multiple of 256 KiB, never below one unit.
pub fn align_chunk_size(chunk_size: u64) -> u64 {
    (chunk_size / CHUNK_ALIGNMENT).max(1) * CHUNK_ALIGNMENT
}

/// Where credentials live and which scopes they carry.
#[derive(Debug, Clone)]
pub struct CredentialConfig {
    /// Persisted refresh-token file
    pub credentials_path: PathBuf,
    /// OAuth client secrets used by the interactive flow
    pub client_secrets_path: PathBuf,
    /// Scopes requested and written back on legacy migration
    pub scopes: Vec<String>,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            credentials_path: PathBuf::from("credential.json"),
            client_secrets_path: PathBuf::from("client_secret.json"),
            scopes: vec![UPLOAD_SCOPE.to_string()],
        }
    }
}

impl CredentialConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            credentials_path: std::env::var("VPUB_CREDENTIALS_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.credentials_path),
            client_secrets_path: std::env::var("VPUB_CLIENT_SECRETS_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.client_secrets_path),
            scopes: defaults.scopes,
        }
    }
}
