//! Analysis job message carried on the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fv_models::{AnalysisOptions, AnalysisProfile, JobId, SourceDescriptor};

/// Priority used when the producer does not supply one.
pub const DEFAULT_PRIORITY: u8 = 5;

fn default_priority() -> u8 {
    DEFAULT_PRIORITY
}

/// Named priorities used by the API layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl JobPriority {
    /// Numeric hint in 0-10.
    pub fn value(&self) -> u8 {
        match self {
            JobPriority::Low => 3,
            JobPriority::Normal => 5,
            JobPriority::High => 8,
            JobPriority::Critical => 10,
        }
    }
}

/// Message asking a worker to analyze one job.
///
/// The job record already exists in the datastore (status `pending`) when
/// this is enqueued. Delivery is at-least-once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeMediaJob {
    pub job_id: JobId,
    pub source: SourceDescriptor,
    #[serde(default)]
    pub options: AnalysisOptions,
    /// 0-10; higher is served first when possible
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub profile: AnalysisProfile,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl AnalyzeMediaJob {
    pub fn new(job_id: JobId, source: SourceDescriptor) -> Self {
        Self {
            job_id,
            source,
            options: AnalysisOptions::default(),
            priority: DEFAULT_PRIORITY,
            profile: AnalysisProfile::Standard,
            created_at: Utc::now(),
        }
    }

    pub fn with_options(mut self, options: AnalysisOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the priority hint, clamped to 0-10.
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.min(10);
        self
    }

    pub fn with_profile(mut self, profile: AnalysisProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Generate idempotency key for deduplication.
    pub fn idempotency_key(&self) -> String {
        format!("analyze:{}", self.job_id)
    }
}
