//! Worker metrics.
//!
//! Recorded through the `metrics` facade; exported to Prometheus only when
//! a port is configured.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{WorkerError, WorkerResult};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_TOTAL: &str = "fv_jobs_total";
    pub const FRAMES_SCORED_TOTAL: &str = "fv_frames_scored_total";
    pub const DEAD_LETTERED_TOTAL: &str = "fv_dead_lettered_total";
    pub const JOB_DURATION_SECONDS: &str = "fv_job_duration_seconds";
    pub const JOBS_IN_FLIGHT: &str = "fv_jobs_in_flight";
}

/// Install the Prometheus recorder with an HTTP listener on `port`.
pub fn install_exporter(port: u16) -> WorkerResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .map_err(|e| WorkerError::config_error(format!("metrics exporter: {}", e)))
}

/// Record a finished execution by outcome label.
pub fn record_job(outcome: &'static str, duration_secs: f64) {
    counter!(names::JOBS_TOTAL, "outcome" => outcome).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "outcome" => outcome).record(duration_secs);
}

pub fn record_frames_scored(count: u64) {
    counter!(names::FRAMES_SCORED_TOTAL).increment(count);
}

pub fn record_dead_lettered() {
    counter!(names::DEAD_LETTERED_TOTAL).increment(1);
}

pub fn job_started() {
    gauge!(names::JOBS_IN_FLIGHT).increment(1.0);
}

pub fn job_finished() {
    gauge!(names::JOBS_IN_FLIGHT).decrement(1.0);
}
