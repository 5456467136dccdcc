//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

use fv_models::{ErrorCode, SourceError};

use crate::limits::{describe_duration_limit, describe_size_limit};

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors from probing and decoding local media.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MediaError {
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn invalid_video(message: impl Into<String>) -> Self {
        Self::InvalidVideo(message.into())
    }
}

/// Result type for source acquisition.
pub type AcquireResult<T> = Result<T, AcquireError>;

/// Acquisition failures. Every variant is terminal for the job.
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("Invalid source: {0}")]
    InvalidSource(String),

    #[error("Source duration {duration:.0}s exceeds limit of {limit:.0}s")]
    TooLong { duration: f64, limit: f64 },

    #[error("Source unavailable: {0}")]
    Unavailable(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Downloaded file is {size} bytes, limit is {limit}")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("yt-dlp not found in PATH")]
    YtDlpNotFound,

    #[error("Scratch directory error: {0}")]
    Scratch(#[source] std::io::Error),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),
}

impl AcquireError {
    pub fn download_failed(msg: impl Into<String>) -> Self {
        Self::DownloadFailed(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Error code recorded on the job.
    pub fn code(&self) -> ErrorCode {
        match self {
            AcquireError::InvalidSource(_) => ErrorCode::InvalidSource,
            AcquireError::TooLong { .. } => ErrorCode::SourceTooLong,
            AcquireError::Unavailable(_) => ErrorCode::SourceUnavailable,
            AcquireError::DownloadFailed(_) | AcquireError::YtDlpNotFound => {
                ErrorCode::DownloadFailed
            }
            AcquireError::FileTooLarge { .. } => ErrorCode::FileTooLarge,
            AcquireError::Media(_) => ErrorCode::MediaDecodeError,
            AcquireError::Scratch(_) => ErrorCode::ProcessingError,
        }
    }

    /// Message shown to the user through `error_message`.
    pub fn user_message(&self) -> String {
        match self {
            AcquireError::InvalidSource(detail) => format!("Invalid video URL: {}", detail),
            AcquireError::TooLong { limit, .. } => {
                format!("Video exceeds {} limit", describe_duration_limit(*limit))
            }
            AcquireError::Unavailable(_) => "Video is unavailable or private".to_string(),
            AcquireError::DownloadFailed(_) | AcquireError::YtDlpNotFound => {
                "Failed to download video. Please try again".to_string()
            }
            AcquireError::FileTooLarge { limit, .. } => {
                format!("Video file exceeds {} limit", describe_size_limit(*limit))
            }
            AcquireError::Media(e) => format!("Could not read video: {}", e),
            AcquireError::Scratch(_) => "Internal error while preparing video".to_string(),
        }
    }
}

impl From<SourceError> for AcquireError {
    fn from(err: SourceError) -> Self {
        Self::InvalidSource(err.to_string())
    }
}
