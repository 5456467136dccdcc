//! Job-unique scratch directories.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use fv_models::JobId;

/// Ephemeral directory holding a job's downloaded media.
///
/// The directory is removed when the value is dropped, so every exit path
/// (success, error, panic unwinding) cleans up. [`ScratchDir::cleanup`]
/// removes it eagerly off the async runtime.
#[derive(Debug)]
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    /// Create `<work_dir>/fv-<job_id>-XXXXXX`.
    pub async fn create(work_dir: impl AsRef<Path>, job_id: &JobId) -> std::io::Result<Self> {
        let work_dir = work_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&work_dir).await?;

        let prefix = format!("fv-{}-", job_id);
        let dir = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new().prefix(&prefix).tempdir_in(&work_dir)
        })
        .await
        .map_err(std::io::Error::other)??;

        debug!("Created scratch dir {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn join(&self, name: impl AsRef<Path>) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Remove the directory and everything in it.
    pub async fn cleanup(self) {
        let path = self.dir.path().to_path_buf();
        let result = tokio::task::spawn_blocking(move || self.dir.close()).await;
        match result {
            Ok(Ok(())) => debug!("Removed scratch dir {}", path.display()),
            Ok(Err(e)) => warn!("Failed to remove scratch dir {}: {}", path.display(), e),
            Err(e) => warn!("Scratch cleanup task failed for {}: {}", path.display(), e),
        }
    }
}
