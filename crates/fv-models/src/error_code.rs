//! Error taxonomy surfaced through the job record.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-readable failure code stored in `error_code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Source reference did not match an accepted shape
    InvalidSource,
    /// Source duration exceeds the applicable policy ceiling
    SourceTooLong,
    /// Source is private, removed or otherwise unreachable
    SourceUnavailable,
    /// Transfer failed
    DownloadFailed,
    /// Downloaded file exceeds the byte cap
    FileTooLarge,
    /// Media could not be decoded
    MediaDecodeError,
    /// Scoring capability failed or timed out
    ScoringError,
    /// Catch-all for unexpected failures
    ProcessingError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidSource => "INVALID_SOURCE",
            ErrorCode::SourceTooLong => "SOURCE_TOO_LONG",
            ErrorCode::SourceUnavailable => "SOURCE_UNAVAILABLE",
            ErrorCode::DownloadFailed => "DOWNLOAD_FAILED",
            ErrorCode::FileTooLarge => "FILE_TOO_LARGE",
            ErrorCode::MediaDecodeError => "MEDIA_DECODE_ERROR",
            ErrorCode::ScoringError => "SCORING_ERROR",
            ErrorCode::ProcessingError => "PROCESSING_ERROR",
        }
    }

    /// Parse the stored string form. Unknown codes collapse to `ProcessingError`.
    pub fn parse(s: &str) -> Self {
        match s {
            "INVALID_SOURCE" => ErrorCode::InvalidSource,
            "SOURCE_TOO_LONG" => ErrorCode::SourceTooLong,
            "SOURCE_UNAVAILABLE" => ErrorCode::SourceUnavailable,
            "DOWNLOAD_FAILED" => ErrorCode::DownloadFailed,
            "FILE_TOO_LARGE" => ErrorCode::FileTooLarge,
            "MEDIA_DECODE_ERROR" => ErrorCode::MediaDecodeError,
            "SCORING_ERROR" => ErrorCode::ScoringError,
            _ => ErrorCode::ProcessingError,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Failure carried by a job in the `failed` state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct JobError {
    pub code: ErrorCode,
    pub message: String,
}

impl JobError {
    /// Build an error, substituting a generic message when `message` is blank.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            format!("Analysis failed ({})", code)
        } else {
            message
        };
        Self { code, message }
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}
