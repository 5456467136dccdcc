//! Worker error types.

use thiserror::Error;

use fv_detect::DetectError;
use fv_media::{AcquireError, MediaError};
use fv_models::{ErrorCode, JobError, JobId, JobStatus};

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Infrastructure failures. These leave the message unacknowledged so the
/// broker can redeliver it; stage failures are recorded on the job instead.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job {job_id} is already {status}")]
    TerminalState { job_id: JobId, status: JobStatus },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Queue operation failed: {0}")]
    QueueFailed(String),

    #[error("Store error: {0}")]
    Store(#[from] fv_store::StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] fv_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn queue_failed(msg: impl Into<String>) -> Self {
        Self::QueueFailed(msg.into())
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Store(e) => e.is_retryable(),
            WorkerError::Queue(_) | WorkerError::QueueFailed(_) | WorkerError::Io(_) => true,
            WorkerError::TerminalState { .. } | WorkerError::ConfigError(_) => false,
        }
    }
}

/// A stage ended the job. Carries the code and user-facing message written
/// to the job record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct StageFailure {
    pub code: ErrorCode,
    pub message: String,
}

impl StageFailure {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        let error = JobError::new(code, message);
        Self {
            code: error.code,
            message: error.message,
        }
    }

    pub fn processing(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ProcessingError, message)
    }

    pub fn to_job_error(&self) -> JobError {
        JobError::new(self.code, self.message.clone())
    }
}

impl From<AcquireError> for StageFailure {
    fn from(err: AcquireError) -> Self {
        Self::new(err.code(), err.user_message())
    }
}

impl From<MediaError> for StageFailure {
    fn from(err: MediaError) -> Self {
        let message = match &err {
            MediaError::FfmpegNotFound | MediaError::FfprobeNotFound => {
                return Self::processing("Video decoder is not available");
            }
            MediaError::FfmpegFailed { .. } | MediaError::InvalidVideo(_) => {
                format!("Could not decode video: {}", err)
            }
            _ => format!("Could not read video: {}", err),
        };
        Self::new(ErrorCode::MediaDecodeError, message)
    }
}

impl From<DetectError> for StageFailure {
    fn from(err: DetectError) -> Self {
        let message = match &err {
            DetectError::Timeout { .. } => "Frame analysis timed out".to_string(),
            _ => format!("Frame analysis failed: {}", err),
        };
        Self::new(err.code(), message)
    }
}
