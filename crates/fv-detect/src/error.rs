//! Scoring error types.

use std::time::Duration;
use thiserror::Error;

use fv_models::ErrorCode;

pub type DetectResult<T> = Result<T, DetectError>;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("Scoring frame {index} timed out after {timeout:?}")]
    Timeout { index: u64, timeout: Duration },

    #[error("Scorer failed: {0}")]
    ScorerFailed(String),

    #[error("Scorer returned invalid output: {0}")]
    InvalidOutput(String),
}

impl DetectError {
    pub fn scorer_failed(msg: impl Into<String>) -> Self {
        Self::ScorerFailed(msg.into())
    }

    pub fn invalid_output(msg: impl Into<String>) -> Self {
        Self::InvalidOutput(msg.into())
    }

    /// All scoring failures surface as `SCORING_ERROR`.
    pub fn code(&self) -> ErrorCode {
        ErrorCode::ScoringError
    }
}
