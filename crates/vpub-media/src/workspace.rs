//! Per-job scratch directory.

use std::path::Path;

use tempfile::TempDir;
use tracing::{debug, warn};
use vpub_models::JobId;

use crate::error::MediaResult;

/// Scratch directory owned by one job.
///
/// The directory and everything in it are deleted when the workspace is
/// dropped, so cleanup happens on every exit path.
#[derive(Debug)]
pub struct JobWorkspace {
    dir: TempDir,
}

impl JobWorkspace {
    /// Create a fresh directory for `job_id` under `parent`.
    pub fn create_in(parent: impl AsRef<Path>, job_id: &JobId) -> MediaResult<Self> {
        let parent = parent.as_ref();
        std::fs::create_dir_all(parent)?;

        let prefix: String = job_id.as_str().chars().take(8).collect();
        let dir = tempfile::Builder::new()
            .prefix(&format!("vpub-{}-", prefix))
            .tempdir_in(parent)?;

        debug!(job_id = %job_id, path = %dir.path().display(), "Created job workspace");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Delete the directory now, reporting any failure.
    pub fn close(self) -> MediaResult<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close().map_err(|e| {
            warn!(path = %path.display(), "Failed to remove job workspace: {}", e);
            e.into()
        })
    }
}
