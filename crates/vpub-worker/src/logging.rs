//! Structured per-job logging.

use tracing::{error, info, warn, Span};
use vpub_models::Job;

/// Logs job lifecycle events with the job's id, row and title attached.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    row: usize,
    title: String,
}

impl JobLogger {
    pub fn new(job: &Job) -> Self {
        Self {
            job_id: job.id.to_string(),
            row: job.row,
            title: job.title.clone(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            row = self.row,
            title = %self.title,
            "Job started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(job_id = %self.job_id, "Job progress: {}", message);
    }

    pub fn log_warning(&self, message: &str) {
        warn!(job_id = %self.job_id, "Job warning: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            row = self.row,
            title = %self.title,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(job_id = %self.job_id, "Job completed: {}", message);
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Span covering the whole job.
    pub fn span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, row = self.row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vpub_models::{JobId, Privacy};

    #[test]
    fn test_job_logger_creation() {
        let job = Job {
            id: JobId::from_string("job-7"),
            row: 7,
            title: "Seventh".to_string(),
            description_html: String::new(),
            tags: Vec::new(),
            category: "22".to_string(),
            image_urls: Vec::new(),
            privacy: Privacy::Public,
        };

        let logger = JobLogger::new(&job);
        assert_eq!(logger.job_id(), "job-7");
        assert_eq!(logger.row, 7);
    }
}
