//! Media analysis worker.
//!
//! This crate provides:
//! - The job state machine (claim, monotonic progress, terminal writes)
//! - The analysis pipeline orchestrator shared by queue and inline paths
//! - The queue executor with prefetch, retry and dead-lettering
//! - Graceful shutdown

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod retry;
pub mod state;

pub use config::{PipelineConfig, PipelineLimits, WorkerConfig};
pub use error::{StageFailure, WorkerError, WorkerResult};
pub use executor::{retry_decision, JobExecutor, RetryDecision};
pub use logging::{init_tracing, JobLogger};
pub use pipeline::{AnalysisPipeline, JobOutcome};
pub use state::{force_fail, Claim, JobStateMachine};
