//! Worker and pipeline configuration.

use std::time::Duration;

use fv_detect::AggregationConfig;
use fv_media::AcquisitionLimits;
use fv_models::AnalysisProfile;

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrently held job executions (prefetch)
    pub prefetch: usize,
    /// Parent of per-job scratch directories
    pub work_dir: String,
    /// How often the worker should scan for orphaned pending messages
    pub claim_interval: Duration,
    /// Minimum idle time before a pending message can be claimed (crash recovery)
    pub claim_min_idle: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Blocking read time when the queue is empty
    pub block_ms: u64,
    /// Prometheus exporter port, disabled when unset
    pub metrics_port: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            prefetch: 1,
            work_dir: "/tmp/forensivision".to_string(),
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(300), // 5 minutes
            shutdown_timeout: Duration::from_secs(60),
            block_ms: 1000,
            metrics_port: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            prefetch: env_or("WORKER_PREFETCH", defaults.prefetch).max(1),
            work_dir: std::env::var("WORKER_WORK_DIR").unwrap_or(defaults.work_dir),
            claim_interval: Duration::from_secs(env_or("WORKER_CLAIM_INTERVAL_SECS", 30)),
            claim_min_idle: Duration::from_secs(env_or("WORKER_CLAIM_MIN_IDLE_SECS", 300)),
            shutdown_timeout: Duration::from_secs(env_or("WORKER_SHUTDOWN_TIMEOUT", 60)),
            block_ms: env_or("WORKER_BLOCK_MS", defaults.block_ms),
            metrics_port: std::env::var("METRICS_PORT")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }
}

/// Size and duration limits for one analysis profile.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineLimits {
    pub max_duration_secs: f64,
    pub max_frames: usize,
    pub max_file_size_bytes: u64,
    pub max_resolution: u32,
}

impl PipelineLimits {
    pub fn standard() -> Self {
        Self {
            max_duration_secs: 300.0,
            max_frames: 300,
            max_file_size_bytes: 500 * 1024 * 1024,
            max_resolution: 720,
        }
    }

    pub fn demo() -> Self {
        Self {
            max_duration_secs: 20.0,
            max_frames: 20,
            ..Self::standard()
        }
    }

    /// Acquisition limits with an optional per-job duration request applied.
    pub fn acquisition(&self, requested_duration: Option<f64>) -> AcquisitionLimits {
        AcquisitionLimits {
            max_duration_secs: self.max_duration_secs,
            max_file_size_bytes: self.max_file_size_bytes,
            max_resolution: self.max_resolution,
        }
        .with_requested_duration(requested_duration)
    }
}

/// Pipeline configuration shared by the queue worker and the inline demo path.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub standard: PipelineLimits,
    pub demo: PipelineLimits,
    /// Frames per second sampled when the job doesn't ask for a rate
    pub default_sampling_rate: f64,
    /// Per-frame scoring timeout
    pub score_timeout: Duration,
    pub aggregation: AggregationConfig,
    /// Longest side of decoded frames
    pub frame_max_dimension: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            standard: PipelineLimits::standard(),
            demo: PipelineLimits::demo(),
            default_sampling_rate: 1.0,
            score_timeout: Duration::from_secs(30),
            aggregation: AggregationConfig::default(),
            frame_max_dimension: 512,
        }
    }
}

impl PipelineConfig {
    pub const MIN_SAMPLING_RATE: f64 = 0.1;
    pub const MAX_SAMPLING_RATE: f64 = 30.0;

    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let d = Self::default();
        let max_file_size_bytes = env_or(
            "PIPELINE_MAX_FILE_SIZE_MB",
            d.standard.max_file_size_bytes / (1024 * 1024),
        ) * 1024
            * 1024;
        let max_resolution = env_or("PIPELINE_MAX_RESOLUTION", d.standard.max_resolution);

        Self {
            standard: PipelineLimits {
                max_duration_secs: env_or(
                    "PIPELINE_STANDARD_MAX_DURATION",
                    d.standard.max_duration_secs,
                ),
                max_frames: env_or("PIPELINE_STANDARD_MAX_FRAMES", d.standard.max_frames),
                max_file_size_bytes,
                max_resolution,
            },
            demo: PipelineLimits {
                max_duration_secs: env_or("PIPELINE_DEMO_MAX_DURATION", d.demo.max_duration_secs),
                max_frames: env_or("PIPELINE_DEMO_MAX_FRAMES", d.demo.max_frames),
                max_file_size_bytes,
                max_resolution,
            },
            default_sampling_rate: env_or("PIPELINE_SAMPLING_RATE", d.default_sampling_rate),
            score_timeout: Duration::from_secs(env_or(
                "PIPELINE_SCORE_TIMEOUT_SECS",
                d.score_timeout.as_secs(),
            )),
            aggregation: AggregationConfig {
                suspicious_threshold: env_or(
                    "PIPELINE_SUSPICIOUS_THRESHOLD",
                    d.aggregation.suspicious_threshold,
                ),
                segment_gap_secs: env_or(
                    "PIPELINE_SEGMENT_GAP_SECS",
                    d.aggregation.segment_gap_secs,
                ),
            },
            frame_max_dimension: env_or("PIPELINE_FRAME_MAX_DIMENSION", d.frame_max_dimension),
        }
    }

    pub fn limits_for(&self, profile: AnalysisProfile) -> &PipelineLimits {
        match profile {
            AnalysisProfile::Standard => &self.standard,
            AnalysisProfile::Demo => &self.demo,
        }
    }

    /// Requested rate clamped to the supported range, or the default.
    pub fn sampling_rate(&self, requested: Option<f64>) -> f64 {
        requested
            .filter(|r| r.is_finite())
            .unwrap_or(self.default_sampling_rate)
            .clamp(Self::MIN_SAMPLING_RATE, Self::MAX_SAMPLING_RATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_limits() {
        let config = PipelineConfig::default();
        assert_eq!(config.limits_for(AnalysisProfile::Demo).max_duration_secs, 20.0);
        assert_eq!(config.limits_for(AnalysisProfile::Demo).max_frames, 20);
        assert_eq!(config.limits_for(AnalysisProfile::Standard).max_frames, 300);
    }

    #[test]
    fn test_requested_duration_only_tightens() {
        let demo = PipelineLimits::demo();
        assert_eq!(demo.acquisition(Some(10.0)).max_duration_secs, 10.0);
        assert_eq!(demo.acquisition(Some(600.0)).max_duration_secs, 20.0);
        assert_eq!(demo.acquisition(None).max_duration_secs, 20.0);
    }

    #[test]
    fn test_sampling_rate_clamped() {
        let config = PipelineConfig::default();
        assert_eq!(config.sampling_rate(None), 1.0);
        assert_eq!(config.sampling_rate(Some(0.01)), 0.1);
        assert_eq!(config.sampling_rate(Some(120.0)), 30.0);
        assert_eq!(config.sampling_rate(Some(f64::NAN)), 1.0);
        assert_eq!(config.sampling_rate(Some(2.0)), 2.0);
    }
}
