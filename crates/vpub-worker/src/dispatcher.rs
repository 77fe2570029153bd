//! Throttled, sequential batch dispatch.
//!
//! One job at a time: assemble media in a private workspace, upload the
//! video, attach the thumbnail, record the outcome, then wait out the
//! per-video delay before the next job. A failed job never stops the batch.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use tokio::sync::watch;
use tracing::{info, Instrument};
use vpub_media::{AssembledMedia, JobWorkspace, MediaAssembler};
use vpub_models::{BatchReport, Job, JobOutcome, ThrottleSchedule};
use vpub_upload::{ResumableUploadSession, Sleeper, ThumbnailUploader, UploadTransport};

use crate::config::BatchConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;

/// Drives a batch of jobs through assembly, upload and thumbnail.
pub struct BatchDispatcher {
    config: BatchConfig,
    assembler: Arc<dyn MediaAssembler>,
    transport: Arc<dyn UploadTransport>,
    sleeper: Arc<dyn Sleeper>,
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl BatchDispatcher {
    pub fn new(
        config: BatchConfig,
        assembler: Arc<dyn MediaAssembler>,
        transport: Arc<dyn UploadTransport>,
        sleeper: Arc<dyn Sleeper>,
    ) -> WorkerResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            assembler,
            transport,
            sleeper,
            cancel_rx: None,
        })
    }

    /// Stop between jobs once the flag turns true; remaining jobs are skipped.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Run every job in order and report one outcome per job.
    pub async fn run(&self, jobs: Vec<Job>) -> WorkerResult<BatchReport> {
        let started_at = Utc::now();
        let schedule = ThrottleSchedule::new(self.config.throttle, jobs.len())?;
        let delay = schedule.per_video_delay();

        info!(
            jobs = jobs.len(),
            videos_per_hour = schedule.videos_per_hour(),
            delay_secs = schedule.per_video_delay_secs(),
            "Starting batch"
        );

        let mut outcomes = Vec::with_capacity(jobs.len());
        let last = jobs.len().saturating_sub(1);

        for (index, job) in jobs.iter().enumerate() {
            if self.is_cancelled() {
                info!(job_id = %job.id, "Batch cancelled, skipping job");
                outcomes.push(JobOutcome::skipped(job, "cancelled"));
                continue;
            }

            let logger = JobLogger::new(job);
            let outcome = self
                .process_job(job, &logger)
                .instrument(logger.span())
                .await;

            counter!(
                "vpub_batch_jobs_total",
                "status" => format!("{:?}", outcome.status).to_lowercase()
            )
            .increment(1);
            outcomes.push(outcome);

            if index < last && !self.is_cancelled() {
                info!(delay_secs = delay.as_secs(), "Sleeping before next video");
                self.throttle(delay).await;
            }
        }

        let report = BatchReport {
            started_at,
            finished_at: Utc::now(),
            videos_per_hour: schedule.videos_per_hour(),
            per_video_delay_secs: schedule.per_video_delay_secs(),
            outcomes,
        };

        info!(
            uploaded = report.uploaded(),
            failed = report.failed(),
            skipped = report.skipped(),
            thumbnails_failed = report.thumbnails_failed(),
            "Batch finished"
        );
        Ok(report)
    }

    /// One job, start to finish. The workspace is removed on every path.
    async fn process_job(&self, job: &Job, logger: &JobLogger) -> JobOutcome {
        let started_at = Utc::now();
        logger.log_start(&format!("{} image(s)", job.image_urls.len()));

        let metadata = job.metadata();
        if let Err(e) = metadata.validate() {
            let err = WorkerError::from(e);
            logger.log_error(&err.to_string());
            return JobOutcome::failed(job, err.to_string(), err.kind(), 0, started_at);
        }

        let workspace = match JobWorkspace::create_in(&self.config.work_dir, &job.id) {
            Ok(workspace) => workspace,
            Err(e) => {
                let err = WorkerError::from(e);
                logger.log_error(&err.to_string());
                return JobOutcome::failed(job, err.to_string(), err.kind(), 0, started_at);
            }
        };

        let outcome = match self.assembler.assemble(job, workspace.path()).await {
            Ok(media) => self.publish(job, media, logger, started_at).await,
            Err(e) => {
                let err = WorkerError::from(e);
                logger.log_error(&err.to_string());
                JobOutcome::failed(job, err.to_string(), err.kind(), 0, started_at)
            }
        };

        if let Err(e) = workspace.close() {
            logger.log_warning(&format!("workspace cleanup failed: {}", e));
        }
        outcome
    }

    async fn publish(
        &self,
        job: &Job,
        media: AssembledMedia,
        logger: &JobLogger,
        started_at: chrono::DateTime<Utc>,
    ) -> JobOutcome {
        let mut session = ResumableUploadSession::new(
            &*self.transport,
            &*self.sleeper,
            &self.config.upload,
            &media.video,
            job.metadata(),
        );
        if let Some(cancel_rx) = &self.cancel_rx {
            session = session.with_cancel(cancel_rx.clone());
        }

        let remote_id = match session.run().await {
            Ok(remote_id) => remote_id,
            Err(e) => {
                let kind = e.kind_with(&self.config.upload.retriable_statuses);
                logger.log_error(&e.to_string());
                return JobOutcome::failed(
                    job,
                    e.to_string(),
                    kind,
                    session.retry_count(),
                    started_at,
                );
            }
        };

        logger.log_progress(&format!("video uploaded as {}", remote_id));
        let outcome = JobOutcome::uploaded(job, &remote_id, session.retry_count(), started_at);

        match ThumbnailUploader::new(&*self.transport)
            .set_for_session(&session, &media.thumbnail)
            .await
        {
            Ok(()) => {
                logger.log_completion(&remote_id);
                outcome
            }
            Err(e) => {
                logger.log_warning(&format!("thumbnail failed: {}", e));
                outcome.with_thumbnail_error(e.to_string())
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Inter-job wait; returns early if the batch is cancelled.
    async fn throttle(&self, delay: Duration) {
        let Some(cancel_rx) = &self.cancel_rx else {
            self.sleeper.sleep(delay).await;
            return;
        };

        let mut cancel_rx = cancel_rx.clone();
        let cancelled = async move {
            loop {
                if *cancel_rx.borrow_and_update() {
                    return;
                }
                if cancel_rx.changed().await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
        };

        tokio::select! {
            _ = self.sleeper.sleep(delay) => {}
            _ = cancelled => info!("Batch cancelled during throttle wait"),
        }
    }
}
