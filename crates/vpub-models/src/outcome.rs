//! Per-job outcomes and the aggregate batch report.

use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::{Job, JobId};

/// Failure taxonomy shared by upload sessions and batch outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connection reset, incomplete response, send/receive failure
    RetriableTransport,
    /// HTTP 500/502/503/504
    RetriableService,
    /// Any other non-success HTTP status
    FatalService,
    /// More retriable failures than the session's retry cap
    RetryBudgetExhausted,
    /// Completion reported without a resource id, or inconsistent progress
    UnexpectedResponse,
    /// External media assembly failed
    Assembly,
    /// Credentials could not be obtained
    Auth,
    /// Local file or metadata unusable
    InvalidInput,
    /// Stopped by a cancellation signal
    Cancelled,
    /// The session was already in a failed terminal state
    SessionTerminated,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::RetriableTransport => "retriable_transport",
            ErrorKind::RetriableService => "retriable_service",
            ErrorKind::FatalService => "fatal_service",
            ErrorKind::RetryBudgetExhausted => "retry_budget_exhausted",
            ErrorKind::UnexpectedResponse => "unexpected_response",
            ErrorKind::Assembly => "assembly",
            ErrorKind::Auth => "auth",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::SessionTerminated => "session_terminated",
        }
    }

    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            ErrorKind::RetriableTransport | ErrorKind::RetriableService
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Video uploaded (the thumbnail may still have failed)
    Uploaded,
    /// Assembly or upload failed
    Failed,
    /// Never started because the batch was cancelled
    Skipped,
}

/// Outcome record for a single job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobOutcome {
    pub job_id: JobId,
    pub title: String,
    pub status: OutcomeStatus,

    /// Remote resource id assigned by the hosting service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,

    /// Error that prevented the video from being published
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_error: Option<String>,

    /// Error classification for `upload_error`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,

    /// Thumbnail failure, recorded separately from the upload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_error: Option<String>,

    /// Retries spent by the upload session
    #[serde(default)]
    pub retries: u32,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl JobOutcome {
    /// Record a published video.
    pub fn uploaded(
        job: &Job,
        remote_id: impl Into<String>,
        retries: u32,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id: job.id.clone(),
            title: job.title.clone(),
            status: OutcomeStatus::Uploaded,
            remote_id: Some(remote_id.into()),
            upload_error: None,
            error_kind: None,
            thumbnail_error: None,
            retries,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Record a job whose assembly or upload failed.
    pub fn failed(
        job: &Job,
        error: impl Into<String>,
        kind: ErrorKind,
        retries: u32,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id: job.id.clone(),
            title: job.title.clone(),
            status: OutcomeStatus::Failed,
            remote_id: None,
            upload_error: Some(error.into()),
            error_kind: Some(kind),
            thumbnail_error: None,
            retries,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Record a job that never ran.
    pub fn skipped(job: &Job, reason: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            job_id: job.id.clone(),
            title: job.title.clone(),
            status: OutcomeStatus::Skipped,
            remote_id: None,
            upload_error: Some(reason.into()),
            error_kind: Some(ErrorKind::Cancelled),
            thumbnail_error: None,
            retries: 0,
            started_at: now,
            finished_at: now,
        }
    }

    /// Attach a thumbnail failure.
    pub fn with_thumbnail_error(mut self, error: impl Into<String>) -> Self {
        self.thumbnail_error = Some(error.into());
        self.finished_at = Utc::now();
        self
    }

    pub fn is_uploaded(&self) -> bool {
        self.status == OutcomeStatus::Uploaded
    }
}

/// Aggregate result of a batch run, one outcome per job in source order.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub videos_per_hour: u32,
    pub per_video_delay_secs: u64,
    pub outcomes: Vec<JobOutcome>,
}

impl BatchReport {
    pub fn uploaded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_uploaded()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Failed)
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Skipped)
            .count()
    }

    pub fn thumbnails_failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.thumbnail_error.is_some())
            .count()
    }

    /// JSON schema of the report document.
    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(BatchReport)
    }
}
