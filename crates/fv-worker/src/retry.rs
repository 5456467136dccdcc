//! Retries for bookkeeping writes.
//!
//! Pipeline stages never retry. These helpers only cover the store writes
//! that must land before a message is acknowledged or dead-lettered, and
//! the background claim loop's error logging.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::WorkerError;

/// Errors that may succeed on a later attempt.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for WorkerError {
    fn is_transient(&self) -> bool {
        self.is_retryable()
    }
}

impl Transient for fv_store::StoreError {
    fn is_transient(&self) -> bool {
        self.is_retryable()
    }
}

/// Backoff schedule for one named write.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub operation_name: String,
}

impl RetryConfig {
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            operation_name: operation_name.into(),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// `base * 2^attempt`, capped at `max_delay`.
    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(1u32 << attempt.min(16))
            .min(self.max_delay)
    }
}

/// Outcome of [`retry_async`].
#[derive(Debug)]
pub enum RetryResult<T, E> {
    Success(T),
    /// The last error, and how many attempts were made in total.
    Failed { error: E, attempts: u32 },
}

impl<T, E> RetryResult<T, E> {
    pub fn into_result(self) -> Result<T, E> {
        match self {
            RetryResult::Success(v) => Ok(v),
            RetryResult::Failed { error, .. } => Err(error),
        }
    }
}

/// Run `operation` until it succeeds, fails with a non-transient error, or
/// `config.max_retries` retries are spent.
///
/// ```ignore
/// let config = RetryConfig::new("mark_failed");
/// let result = retry_async(&config, || force_fail(store, &job_id, error.clone())).await;
/// ```
pub async fn retry_async<F, Fut, T, E>(config: &RetryConfig, operation: F) -> RetryResult<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + Display,
{
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        let error = match operation().await {
            Ok(value) => return RetryResult::Success(value),
            Err(e) => e,
        };

        if !error.is_transient() || attempts > config.max_retries {
            if attempts > 1 {
                warn!(
                    "{} gave up after {} attempts: {}",
                    config.operation_name, attempts, error
                );
            }
            return RetryResult::Failed { error, attempts };
        }

        let delay = config.backoff(attempts);
        debug!(
            "{} attempt {} failed, retrying in {:?}: {}",
            config.operation_name, attempts, delay, error
        );
        tokio::time::sleep(delay).await;
    }
}

/// Rate-limits error logs from the pending-claim loop while Redis is down.
#[derive(Debug)]
pub struct FailureTracker {
    consecutive: u32,
    log_limit: u32,
}

impl FailureTracker {
    pub fn new(log_limit: u32) -> Self {
        Self {
            consecutive: 0,
            log_limit,
        }
    }

    pub fn record_success(&mut self) {
        if self.consecutive > self.log_limit {
            debug!("Recovered after {} consecutive failures", self.consecutive);
        }
        self.consecutive = 0;
    }

    /// Whether this failure should be logged.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive = self.consecutive.saturating_add(1);
        if self.consecutive == self.log_limit + 1 {
            warn!(
                "Suppressing further failure logs after {} consecutive failures",
                self.log_limit
            );
        }
        self.consecutive <= self.log_limit
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive
    }
}
