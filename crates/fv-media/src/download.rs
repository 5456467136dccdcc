//! Source metadata probing and transfer.
//!
//! Remote sources go through yt-dlp; uploads staged on local disk are
//! probed with FFprobe and copied into the job's scratch directory.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use fv_models::ResolvedSource;

use crate::error::{AcquireError, AcquireResult};
use crate::limits::AcquisitionLimits;
use crate::probe::probe_video;

/// What to fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchTarget {
    /// Normalized remote video
    Remote(ResolvedSource),
    /// File staged by the API layer
    Local(PathBuf),
}

impl FetchTarget {
    /// Stable identifier used for the scratch file name.
    pub fn source_id(&self) -> String {
        match self {
            FetchTarget::Remote(resolved) => resolved.source_id.clone(),
            FetchTarget::Local(path) => path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload".to_string()),
        }
    }
}

/// Metadata known before any bulk transfer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceMetadata {
    pub source_id: String,
    pub title: Option<String>,
    pub duration_seconds: Option<f64>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
}

/// Capability for probing and transferring a source.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Fetch metadata only. Must not transfer media.
    async fn probe(&self, target: &FetchTarget) -> AcquireResult<SourceMetadata>;

    /// Transfer the media to `dest`, honoring the resolution and size caps.
    async fn fetch(
        &self,
        target: &FetchTarget,
        dest: &Path,
        limits: &AcquisitionLimits,
    ) -> AcquireResult<()>;
}

/// Production fetcher backed by the yt-dlp and ffprobe CLIs.
#[derive(Debug, Clone, Default)]
pub struct CliFetcher;

impl CliFetcher {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: String,
    title: Option<String>,
    duration: Option<f64>,
    height: Option<u32>,
    fps: Option<f64>,
    #[serde(default)]
    is_live: Option<bool>,
}

#[async_trait]
impl SourceFetcher for CliFetcher {
    async fn probe(&self, target: &FetchTarget) -> AcquireResult<SourceMetadata> {
        match target {
            FetchTarget::Remote(resolved) => probe_remote(resolved).await,
            FetchTarget::Local(path) => probe_local(path).await,
        }
    }

    async fn fetch(
        &self,
        target: &FetchTarget,
        dest: &Path,
        limits: &AcquisitionLimits,
    ) -> AcquireResult<()> {
        match target {
            FetchTarget::Remote(resolved) => download_remote(resolved, dest, limits).await,
            FetchTarget::Local(path) => {
                tokio::fs::copy(path, dest).await.map_err(|e| {
                    AcquireError::download_failed(format!(
                        "copy {} failed: {}",
                        path.display(),
                        e
                    ))
                })?;
                Ok(())
            }
        }
    }
}

async fn probe_remote(resolved: &ResolvedSource) -> AcquireResult<SourceMetadata> {
    which::which("yt-dlp").map_err(|_| AcquireError::YtDlpNotFound)?;

    debug!("Probing metadata for {}", resolved.canonical_url);

    let output = Command::new("yt-dlp")
        .args([
            "--dump-single-json",
            "--skip-download",
            "--no-playlist",
            "--no-warnings",
        ])
        .arg(&resolved.canonical_url)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| AcquireError::download_failed(e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(classify_ytdlp_error(&stderr));
    }

    let info: YtDlpInfo = serde_json::from_slice(&output.stdout)
        .map_err(|e| AcquireError::download_failed(format!("unreadable metadata: {}", e)))?;

    if info.is_live == Some(true) {
        return Err(AcquireError::unavailable("live streams cannot be analyzed"));
    }

    Ok(SourceMetadata {
        source_id: info.id,
        title: info.title,
        duration_seconds: info.duration,
        height: info.height,
        fps: info.fps,
    })
}

async fn probe_local(path: &Path) -> AcquireResult<SourceMetadata> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Err(AcquireError::unavailable(format!(
            "uploaded file {} not found",
            path.display()
        )));
    }

    let info = probe_video(path).await?;
    Ok(SourceMetadata {
        source_id: FetchTarget::Local(path.to_path_buf()).source_id(),
        title: path.file_name().map(|n| n.to_string_lossy().into_owned()),
        duration_seconds: Some(info.duration),
        height: Some(info.height).filter(|h| *h > 0),
        fps: Some(info.fps),
    })
}

async fn download_remote(
    resolved: &ResolvedSource,
    dest: &Path,
    limits: &AcquisitionLimits,
) -> AcquireResult<()> {
    which::which("yt-dlp").map_err(|_| AcquireError::YtDlpNotFound)?;

    info!(
        "Downloading {} to {}",
        resolved.canonical_url,
        dest.display()
    );

    let output = Command::new("yt-dlp")
        .arg("-f")
        .arg(limits.format_selector())
        .arg("--max-filesize")
        .arg(limits.max_file_size_bytes.to_string())
        .args(["--no-playlist", "--no-part", "--no-warnings", "-o"])
        .arg(dest)
        .arg(&resolved.canonical_url)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| AcquireError::download_failed(e.to_string()))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    // The size cap skips the download, sometimes with a zero exit status
    if let Some(err) = oversized_notice(&stdout, limits.max_file_size_bytes)
        .or_else(|| oversized_notice(&stderr, limits.max_file_size_bytes))
    {
        return Err(err);
    }

    if !output.status.success() {
        debug!("yt-dlp stderr: {}", stderr);
        return Err(classify_ytdlp_error(&stderr));
    }

    Ok(())
}

/// Detect yt-dlp's `--max-filesize` notice, e.g.
/// `File is larger than max-filesize (52428800 bytes > 1048576 bytes). Aborting.`
pub(crate) fn oversized_notice(output: &str, limit: u64) -> Option<AcquireError> {
    let line = output.lines().find(|l| {
        let l = l.to_lowercase();
        l.contains("larger than max-filesize") || l.contains("exceeded the maximum filesize")
    })?;
    let size = line
        .rsplit_once('(')
        .and_then(|(_, rest)| rest.split_whitespace().next())
        .and_then(|n| n.parse::<u64>().ok())
        .unwrap_or_else(|| limit.saturating_add(1));
    Some(AcquireError::FileTooLarge { size, limit })
}

/// Map yt-dlp stderr to an acquisition error.
///
/// Sources that no retry can fix (private, removed, region/age locked)
/// become `Unavailable`; everything else is a transfer failure.
pub(crate) fn classify_ytdlp_error(stderr: &str) -> AcquireError {
    let last_line = stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("Unknown error")
        .trim()
        .to_string();
    let msg = stderr.to_lowercase();

    let unavailable = msg.contains("private video")
        || msg.contains("video is private")
        || msg.contains("video unavailable")
        || msg.contains("video is unavailable")
        || msg.contains("video not available")
        || msg.contains("has been removed")
        || msg.contains("was deleted")
        || msg.contains("not available in your country")
        || msg.contains("blocked in your country")
        || (msg.contains("copyright") && msg.contains("block"))
        || (msg.contains("age") && (msg.contains("restrict") || msg.contains("verif")))
        || (msg.contains("premiere") && msg.contains("will begin"));

    if unavailable {
        AcquireError::Unavailable(last_line)
    } else {
        AcquireError::DownloadFailed(last_line)
    }
}
