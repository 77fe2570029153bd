//! End-to-end batch behaviour against scripted collaborators.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::watch;
use url::Url;
use vpub_media::{AssembledMedia, MediaAssembler, MediaError, MediaResult};
use vpub_models::{ErrorKind, Job, JobId, OutcomeStatus, Privacy};
use vpub_upload::testing::{RecordingSleeper, Reply, ScriptedTransport};
use vpub_upload::BackoffPolicy;
use vpub_worker::BatchConfig;
use vpub_worker::BatchDispatcher;

/// Writes a small video and thumbnail instead of running the encoder.
#[derive(Default)]
struct FakeAssembler {
    fail_titles: Vec<String>,
    workspaces: Mutex<Vec<PathBuf>>,
}

impl FakeAssembler {
    fn failing(titles: &[&str]) -> Self {
        Self {
            fail_titles: titles.iter().map(|t| t.to_string()).collect(),
            ..Self::default()
        }
    }

    fn workspaces(&self) -> Vec<PathBuf> {
        self.workspaces.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaAssembler for FakeAssembler {
    async fn assemble(&self, job: &Job, workspace: &Path) -> MediaResult<AssembledMedia> {
        self.workspaces.lock().unwrap().push(workspace.to_path_buf());

        if self.fail_titles.contains(&job.title) {
            return Err(MediaError::download_failed(
                "https://img.example.com/1.png",
                "HTTP 404",
            ));
        }

        let video = workspace.join("output.mp4");
        let thumbnail = workspace.join("thumbnail.jpg");
        std::fs::write(&video, vec![9u8; 4096])?;
        std::fs::write(&thumbnail, vec![1u8; 64])?;
        Ok(AssembledMedia { video, thumbnail })
    }
}

fn job(title: &str, row: usize) -> Job {
    Job {
        id: JobId::new(),
        row,
        title: title.to_string(),
        description_html: format!("<p>{}</p>", title),
        tags: vec!["slides".to_string()],
        category: "22".to_string(),
        image_urls: vec![Url::parse("https://img.example.com/1.png").unwrap()],
        privacy: Privacy::Public,
    }
}

fn jobs(titles: &[&str]) -> Vec<Job> {
    titles
        .iter()
        .enumerate()
        .map(|(i, title)| job(title, i + 1))
        .collect()
}

fn config(work_dir: &TempDir) -> BatchConfig {
    let mut config = BatchConfig::default().with_work_dir(work_dir.path());
    config.upload = config.upload.with_backoff(BackoffPolicy::immediate());
    config
}

fn is_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path).unwrap().next().is_none()
}

#[tokio::test]
async fn test_fatal_failure_is_isolated_and_throttle_still_applies() {
    let work_dir = TempDir::new().unwrap();
    let assembler = Arc::new(FakeAssembler::default());
    let transport =
        Arc::new(ScriptedTransport::new().with_chunk_replies(vec![Reply::Accept, Reply::Status(400)]));
    let sleeper = Arc::new(RecordingSleeper::new());

    let dispatcher = BatchDispatcher::new(
        config(&work_dir),
        assembler.clone(),
        transport.clone(),
        sleeper.clone(),
    )
    .unwrap();

    let report = dispatcher.run(jobs(&["one", "two", "three"])).await.unwrap();

    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(report.per_video_delay_secs, 400);

    let first = &report.outcomes[0];
    assert_eq!(first.status, OutcomeStatus::Uploaded);
    assert_eq!(first.remote_id.as_deref(), Some("video-1"));

    let second = &report.outcomes[1];
    assert_eq!(second.status, OutcomeStatus::Failed);
    assert_eq!(second.error_kind, Some(ErrorKind::FatalService));
    assert_eq!(second.retries, 0);
    assert!(second.remote_id.is_none());

    let third = &report.outcomes[2];
    assert_eq!(third.status, OutcomeStatus::Uploaded);
    assert_eq!(third.remote_id.as_deref(), Some("video-3"));

    assert_eq!(
        sleeper.durations(),
        vec![Duration::from_secs(400), Duration::from_secs(400)]
    );

    // Thumbnails only for the two published videos
    let thumbnails: Vec<String> = transport
        .thumbnails()
        .into_iter()
        .map(|t| t.remote_id)
        .collect();
    assert_eq!(thumbnails, vec!["video-1", "video-3"]);

    assert_eq!(assembler.workspaces().len(), 3);
    assert!(assembler.workspaces().iter().all(|p| !p.exists()));
    assert!(is_empty_dir(work_dir.path()));
}

#[tokio::test]
async fn test_assembly_failure_is_recorded_and_cleaned_up() {
    let work_dir = TempDir::new().unwrap();
    let assembler = Arc::new(FakeAssembler::failing(&["broken"]));
    let transport = Arc::new(ScriptedTransport::new());
    let sleeper = Arc::new(RecordingSleeper::new());

    let dispatcher =
        BatchDispatcher::new(config(&work_dir), assembler, transport.clone(), sleeper).unwrap();

    let report = dispatcher.run(jobs(&["broken", "fine"])).await.unwrap();

    assert_eq!(report.outcomes[0].status, OutcomeStatus::Failed);
    assert_eq!(report.outcomes[0].error_kind, Some(ErrorKind::Assembly));
    assert_eq!(report.outcomes[1].status, OutcomeStatus::Uploaded);
    assert_eq!(transport.session_titles(), vec!["fine"]);
    assert!(is_empty_dir(work_dir.path()));
}

#[tokio::test]
async fn test_thumbnail_failure_keeps_video_uploaded() {
    let work_dir = TempDir::new().unwrap();
    let transport =
        Arc::new(ScriptedTransport::new().with_thumbnail_replies(vec![Reply::Status(403)]));
    let sleeper = Arc::new(RecordingSleeper::new());

    let dispatcher = BatchDispatcher::new(
        config(&work_dir),
        Arc::new(FakeAssembler::default()),
        transport.clone(),
        sleeper,
    )
    .unwrap();

    let report = dispatcher.run(jobs(&["only"])).await.unwrap();
    let outcome = &report.outcomes[0];

    assert_eq!(outcome.status, OutcomeStatus::Uploaded);
    assert!(outcome.thumbnail_error.as_deref().unwrap().contains("403"));
    assert_eq!(report.thumbnails_failed(), 1);
    assert_eq!(transport.thumbnails().len(), 1);
}

#[tokio::test]
async fn test_transient_failures_are_absorbed_by_the_session() {
    let work_dir = TempDir::new().unwrap();
    let transport = Arc::new(
        ScriptedTransport::new().with_chunk_replies(vec![Reply::Status(503), Reply::Disconnect]),
    );
    let sleeper = Arc::new(RecordingSleeper::new());

    let dispatcher = BatchDispatcher::new(
        config(&work_dir),
        Arc::new(FakeAssembler::default()),
        transport,
        sleeper,
    )
    .unwrap();

    let report = dispatcher.run(jobs(&["flaky"])).await.unwrap();
    assert_eq!(report.outcomes[0].status, OutcomeStatus::Uploaded);
    assert_eq!(report.outcomes[0].retries, 2);
}

#[tokio::test]
async fn test_retry_cap_override_exhausts_budget() {
    let work_dir = TempDir::new().unwrap();
    let mut config = config(&work_dir);
    config.upload = config.upload.with_max_retries(2);

    let transport = Arc::new(ScriptedTransport::new().with_chunk_replies(vec![
        Reply::Status(503),
        Reply::Status(502),
        Reply::Status(500),
    ]));
    let sleeper = Arc::new(RecordingSleeper::new());

    let dispatcher = BatchDispatcher::new(
        config,
        Arc::new(FakeAssembler::default()),
        transport,
        sleeper,
    )
    .unwrap();

    let report = dispatcher.run(jobs(&["doomed"])).await.unwrap();
    let outcome = &report.outcomes[0];

    assert_eq!(outcome.status, OutcomeStatus::Failed);
    assert_eq!(outcome.error_kind, Some(ErrorKind::RetryBudgetExhausted));
    assert_eq!(outcome.retries, 2);
}

#[tokio::test]
async fn test_invalid_metadata_fails_without_assembly() {
    let work_dir = TempDir::new().unwrap();
    let assembler = Arc::new(FakeAssembler::default());

    let dispatcher = BatchDispatcher::new(
        config(&work_dir),
        assembler.clone(),
        Arc::new(ScriptedTransport::new()),
        Arc::new(RecordingSleeper::new()),
    )
    .unwrap();

    let report = dispatcher.run(jobs(&["   "])).await.unwrap();
    assert_eq!(report.outcomes[0].error_kind, Some(ErrorKind::InvalidInput));
    assert!(assembler.workspaces().is_empty());
}

#[tokio::test]
async fn test_cancelled_batch_skips_remaining_jobs() {
    let work_dir = TempDir::new().unwrap();
    let (cancel_tx, cancel_rx) = watch::channel(false);
    cancel_tx.send(true).unwrap();

    let transport = Arc::new(ScriptedTransport::new());
    let sleeper = Arc::new(RecordingSleeper::new());

    let dispatcher = BatchDispatcher::new(
        config(&work_dir),
        Arc::new(FakeAssembler::default()),
        transport.clone(),
        sleeper.clone(),
    )
    .unwrap()
    .with_cancel(cancel_rx);

    let report = dispatcher.run(jobs(&["a", "b"])).await.unwrap();

    assert_eq!(report.skipped(), 2);
    assert!(report
        .outcomes
        .iter()
        .all(|o| o.error_kind == Some(ErrorKind::Cancelled)));
    assert_eq!(transport.session_attempts(), 0);
    assert!(sleeper.durations().is_empty());
}

#[tokio::test]
async fn test_throttle_window_depends_on_rate() {
    let work_dir = TempDir::new().unwrap();
    let sleeper = Arc::new(RecordingSleeper::new());

    let dispatcher = BatchDispatcher::new(
        config(&work_dir).with_throttle(1).unwrap(),
        Arc::new(FakeAssembler::default()),
        Arc::new(ScriptedTransport::new()),
        sleeper.clone(),
    )
    .unwrap();

    let report = dispatcher.run(jobs(&["a", "b", "c"])).await.unwrap();

    assert_eq!(report.per_video_delay_secs, 1160);
    assert_eq!(sleeper.total(), Duration::from_secs(2320));
}
