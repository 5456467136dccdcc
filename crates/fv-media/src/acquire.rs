//! Source acquisition: normalize, probe, enforce policy, transfer.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use fv_models::{normalize_source_url, JobId, MediaInfo, SourceDescriptor, SourceKind};

use crate::download::{FetchTarget, SourceFetcher, SourceMetadata};
use crate::error::{AcquireError, AcquireResult};
use crate::limits::AcquisitionLimits;
use crate::probe::DEFAULT_FPS;
use crate::scratch::ScratchDir;

/// Downloaded media owned by the pipeline for the job's lifetime.
///
/// Dropping the handle removes the scratch directory and the file in it.
#[derive(Debug)]
pub struct MediaHandle {
    pub path: PathBuf,
    pub source_id: String,
    pub title: String,
    pub duration_seconds: f64,
    pub height: Option<u32>,
    pub fps: f64,
    pub size_bytes: u64,
    scratch: ScratchDir,
}

impl MediaHandle {
    /// "720p", or "unknown" when the source did not report a height.
    pub fn resolution(&self) -> String {
        self.height
            .map(|h| format!("{}p", h))
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn media_info(&self) -> MediaInfo {
        MediaInfo {
            source_id: self.source_id.clone(),
            title: self.title.clone(),
            duration_seconds: self.duration_seconds,
            resolution: self.resolution(),
            fps: self.fps,
            size_bytes: self.size_bytes,
        }
    }

    pub fn scratch_path(&self) -> &Path {
        self.scratch.path()
    }

    /// Remove the scratch directory now instead of on drop.
    pub async fn release(self) {
        self.scratch.cleanup().await;
    }
}

/// A source that passed the pre-download policy check.
#[derive(Debug, Clone)]
pub struct ProbedSource {
    pub target: FetchTarget,
    pub meta: SourceMetadata,
}

/// Resolves a source and fetches it into a job-unique scratch directory.
pub struct SourceAcquirer {
    fetcher: Arc<dyn SourceFetcher>,
    work_dir: PathBuf,
}

impl SourceAcquirer {
    pub fn new(fetcher: Arc<dyn SourceFetcher>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            work_dir: work_dir.into(),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Acquire `source` under `limits`.
    ///
    /// The duration ceiling is checked before any transfer. The size cap is
    /// re-checked on the finished file. On error the scratch directory is
    /// already gone when this returns.
    pub async fn acquire(
        &self,
        job_id: &JobId,
        source: &SourceDescriptor,
        limits: &AcquisitionLimits,
    ) -> AcquireResult<MediaHandle> {
        let probed = self.inspect(job_id, source, limits).await?;
        self.download(job_id, probed, limits).await
    }

    /// Resolve and probe `source` without transferring it.
    ///
    /// Fails with `TooLong` when the reported duration exceeds the ceiling.
    pub async fn inspect(
        &self,
        job_id: &JobId,
        source: &SourceDescriptor,
        limits: &AcquisitionLimits,
    ) -> AcquireResult<ProbedSource> {
        let target = resolve_target(source)?;

        let meta = self.fetcher.probe(&target).await?;
        if let Some(duration) = meta.duration_seconds {
            if duration > limits.max_duration_secs {
                info!(
                    job_id = %job_id,
                    "Source duration {:.0}s exceeds {:.0}s ceiling, skipping download",
                    duration, limits.max_duration_secs
                );
                return Err(AcquireError::TooLong {
                    duration,
                    limit: limits.max_duration_secs,
                });
            }
        }

        Ok(ProbedSource { target, meta })
    }

    /// Transfer a probed source into a fresh scratch directory.
    pub async fn download(
        &self,
        job_id: &JobId,
        probed: ProbedSource,
        limits: &AcquisitionLimits,
    ) -> AcquireResult<MediaHandle> {
        let ProbedSource { target, meta } = probed;

        let scratch = ScratchDir::create(&self.work_dir, job_id)
            .await
            .map_err(AcquireError::Scratch)?;

        match self.transfer(&target, &meta, &scratch, limits).await {
            Ok((path, size_bytes)) => Ok(build_handle(meta, path, size_bytes, scratch)),
            Err(e) => {
                scratch.cleanup().await;
                Err(e)
            }
        }
    }

    async fn transfer(
        &self,
        target: &FetchTarget,
        meta: &SourceMetadata,
        scratch: &ScratchDir,
        limits: &AcquisitionLimits,
    ) -> AcquireResult<(PathBuf, u64)> {
        let file_stem = if meta.source_id.is_empty() {
            target.source_id()
        } else {
            meta.source_id.clone()
        };
        let path = scratch.join(format!("{}.mp4", file_stem));

        self.fetcher.fetch(target, &path, limits).await?;

        let size_bytes = match tokio::fs::metadata(&path).await {
            Ok(m) => m.len(),
            Err(_) => {
                return Err(AcquireError::download_failed(
                    "transfer finished without producing a file",
                ))
            }
        };

        if size_bytes > limits.max_file_size_bytes {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!("Failed to remove oversized file {}: {}", path.display(), e);
            }
            return Err(AcquireError::FileTooLarge {
                size: size_bytes,
                limit: limits.max_file_size_bytes,
            });
        }

        Ok((path, size_bytes))
    }
}

fn resolve_target(source: &SourceDescriptor) -> AcquireResult<FetchTarget> {
    match source.kind {
        SourceKind::Url => Ok(FetchTarget::Remote(normalize_source_url(&source.locator)?)),
        SourceKind::Upload => {
            if source.locator.trim().is_empty() {
                return Err(AcquireError::InvalidSource("empty upload path".to_string()));
            }
            Ok(FetchTarget::Local(PathBuf::from(&source.locator)))
        }
    }
}

fn build_handle(
    meta: SourceMetadata,
    path: PathBuf,
    size_bytes: u64,
    scratch: ScratchDir,
) -> MediaHandle {
    MediaHandle {
        path,
        source_id: meta.source_id,
        title: meta
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "Unknown".to_string()),
        duration_seconds: meta.duration_seconds.unwrap_or(0.0),
        height: meta.height,
        fps: meta.fps.filter(|f| *f > 0.0).unwrap_or(DEFAULT_FPS),
        size_bytes,
        scratch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fv_models::ErrorCode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeFetcher {
        duration: f64,
        bytes: usize,
        fetch_calls: AtomicUsize,
    }

    impl FakeFetcher {
        fn new(duration: f64, bytes: usize) -> Self {
            Self {
                duration,
                bytes,
                fetch_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SourceFetcher for FakeFetcher {
        async fn probe(&self, target: &FetchTarget) -> AcquireResult<SourceMetadata> {
            Ok(SourceMetadata {
                source_id: target.source_id(),
                title: Some("Clip".to_string()),
                duration_seconds: Some(self.duration),
                height: Some(720),
                fps: None,
            })
        }

        async fn fetch(
            &self,
            _target: &FetchTarget,
            dest: &Path,
            _limits: &AcquisitionLimits,
        ) -> AcquireResult<()> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            tokio::fs::write(dest, vec![0u8; self.bytes])
                .await
                .map_err(|e| AcquireError::download_failed(e.to_string()))
        }
    }

    fn limits(max_duration: f64, max_bytes: u64) -> AcquisitionLimits {
        AcquisitionLimits {
            max_duration_secs: max_duration,
            max_file_size_bytes: max_bytes,
            max_resolution: 720,
        }
    }

    fn source() -> SourceDescriptor {
        SourceDescriptor::url("https://youtu.be/dQw4w9WgXcQ")
    }

    async fn entries(dir: &Path) -> usize {
        let mut rd = tokio::fs::read_dir(dir).await.unwrap();
        let mut n = 0;
        while rd.next_entry().await.unwrap().is_some() {
            n += 1;
        }
        n
    }

    #[tokio::test]
    async fn test_too_long_fails_before_download() {
        let work = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(FakeFetcher::new(400.0, 10));
        let acquirer = SourceAcquirer::new(fetcher.clone(), work.path());

        let err = acquirer
            .acquire(&JobId::new(), &source(), &limits(20.0, 1024))
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::SourceTooLong);
        assert_eq!(fetcher.fetch_calls.load(Ordering::SeqCst), 0);
        assert_eq!(entries(work.path()).await, 0);
    }

    #[tokio::test]
    async fn test_oversized_file_removed() {
        let work = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(FakeFetcher::new(10.0, 600));
        let acquirer = SourceAcquirer::new(fetcher.clone(), work.path());

        let err = acquirer
            .acquire(&JobId::new(), &source(), &limits(20.0, 500))
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::FileTooLarge);
        assert_eq!(fetcher.fetch_calls.load(Ordering::SeqCst), 1);
        // Scratch dir and the file inside it are gone
        assert_eq!(entries(work.path()).await, 0);
    }

    #[tokio::test]
    async fn test_invalid_source_rejected() {
        let work = tempfile::tempdir().unwrap();
        let acquirer = SourceAcquirer::new(Arc::new(FakeFetcher::new(1.0, 1)), work.path());
        let err = acquirer
            .acquire(
                &JobId::new(),
                &SourceDescriptor::url("https://vimeo.com/1234"),
                &limits(20.0, 500),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidSource);
    }

    #[tokio::test]
    async fn test_successful_acquire_and_release() {
        let work = tempfile::tempdir().unwrap();
        let acquirer = SourceAcquirer::new(Arc::new(FakeFetcher::new(12.0, 64)), work.path());

        let handle = acquirer
            .acquire(&JobId::new(), &source(), &limits(20.0, 500))
            .await
            .unwrap();

        assert_eq!(handle.source_id, "dQw4w9WgXcQ");
        assert_eq!(handle.size_bytes, 64);
        assert_eq!(handle.resolution(), "720p");
        assert_eq!(handle.fps, DEFAULT_FPS);
        assert!(handle.path.ends_with("dQw4w9WgXcQ.mp4"));
        assert!(handle.path.exists());

        let scratch = handle.scratch_path().to_path_buf();
        handle.release().await;
        assert!(!scratch.exists());
    }
}
