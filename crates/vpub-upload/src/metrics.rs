//! Upload metrics collection.
//!
//! Counters and histograms for chunk traffic, retries and outcomes. Without
//! an installed recorder the macros are no-ops.

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Chunk requests sent.
    pub const CHUNKS_TOTAL: &str = "vpub_upload_chunks_total";

    /// Bytes acknowledged by the service.
    pub const BYTES_ACKNOWLEDGED_TOTAL: &str = "vpub_upload_bytes_acknowledged_total";

    /// Retry attempts by operation.
    pub const RETRIES_TOTAL: &str = "vpub_upload_retries_total";

    /// Finished sessions by outcome.
    pub const SESSIONS_TOTAL: &str = "vpub_upload_sessions_total";

    /// Thumbnail calls by outcome.
    pub const THUMBNAILS_TOTAL: &str = "vpub_upload_thumbnails_total";

    /// Backoff wait in seconds.
    pub const BACKOFF_SECONDS: &str = "vpub_upload_backoff_seconds";
}

/// Record a chunk request.
pub fn record_chunk(bytes: usize) {
    counter!(names::CHUNKS_TOTAL).increment(1);
    histogram!("vpub_upload_chunk_bytes").record(bytes as f64);
}

/// Record newly acknowledged bytes.
pub fn record_acknowledged(bytes: u64) {
    counter!(names::BYTES_ACKNOWLEDGED_TOTAL).increment(bytes);
}

/// Record a retry and the wait before it.
pub fn record_retry(kind: &str, delay_secs: f64) {
    counter!(
        names::RETRIES_TOTAL,
        "kind" => kind.to_string()
    )
    .increment(1);
    histogram!(names::BACKOFF_SECONDS).record(delay_secs);
}

/// Record a session reaching a terminal state.
pub fn record_session(outcome: &str) {
    counter!(
        names::SESSIONS_TOTAL,
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a thumbnail call.
pub fn record_thumbnail(success: bool) {
    counter!(
        names::THUMBNAILS_TOTAL,
        "outcome" => if success { "ok" } else { "error" }
    )
    .increment(1);
}
