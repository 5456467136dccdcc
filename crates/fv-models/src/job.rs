//! Job records and status transitions.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{AnalysisOptions, AnalysisResult, JobError, MediaInfo, SourceDescriptor};

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created by the API layer, waiting for a worker
    #[default]
    Pending,
    /// Held by exactly one pipeline execution
    Processing,
    /// Result stored
    Completed,
    /// Error stored
    Failed,
    /// Cancelled by the API layer before completion
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal states never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether `self -> next` is a legal transition.
    ///
    /// `processing -> processing` is allowed so that progress updates can
    /// restate the status.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Pending, Processing | Failed | Cancelled) => true,
            (Processing, Processing | Completed | Failed | Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Short label for the stage a job is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Queued,
    Acquiring,
    Downloading,
    Sampling,
    Scoring,
    Aggregating,
    Completed,
    Failed,
    Cancelled,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Queued => "queued",
            Stage::Acquiring => "acquiring",
            Stage::Downloading => "downloading",
            Stage::Sampling => "sampling",
            Stage::Scoring => "scoring",
            Stage::Aggregating => "aggregating",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
            Stage::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Stage::Queued),
            "acquiring" => Some(Stage::Acquiring),
            "downloading" => Some(Stage::Downloading),
            "sampling" => Some(Stage::Sampling),
            "scoring" => Some(Stage::Scoring),
            "aggregating" => Some(Stage::Aggregating),
            "completed" => Some(Stage::Completed),
            "failed" => Some(Stage::Failed),
            "cancelled" => Some(Stage::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The shared job record read by API pollers.
///
/// `error` is present iff `status == Failed`; `result` only once completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobRecord {
    pub id: JobId,
    pub source: SourceDescriptor,
    #[serde(default)]
    pub options: AnalysisOptions,
    pub status: JobStatus,
    /// 0-100, never decreases while the job is alive
    pub progress: u8,
    #[serde(rename = "current_stage")]
    pub stage: Stage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_completed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Create a pending record as the API layer would before enqueueing.
    pub fn new(id: JobId, source: SourceDescriptor, options: AnalysisOptions) -> Self {
        let now = Utc::now();
        Self {
            id,
            source,
            options,
            status: JobStatus::Pending,
            progress: 0,
            stage: Stage::Queued,
            error: None,
            media: None,
            result: None,
            created_at: now,
            updated_at: now,
            processing_started_at: None,
            processing_completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Merge an update into the record and bump `updated_at`.
    ///
    /// The merge itself is unconditional; ordering rules are enforced by
    /// whoever produces the updates.
    pub fn apply(&mut self, update: &JobUpdate) {
        if let Some(status) = update.status {
            self.status = status;
            if status != JobStatus::Failed {
                self.error = None;
            }
        }
        if let Some(progress) = update.progress {
            self.progress = progress.min(100);
        }
        if let Some(stage) = update.stage {
            self.stage = stage;
        }
        if let Some(error) = &update.error {
            self.error = Some(error.clone());
        }
        if let Some(media) = &update.media {
            self.media = Some(media.clone());
        }
        if let Some(result) = &update.result {
            self.result = Some(result.clone());
        }
        if let Some(at) = update.processing_started_at {
            self.processing_started_at = Some(at);
        }
        if let Some(at) = update.processing_completed_at {
            self.processing_completed_at = Some(at);
        }
        self.updated_at = Utc::now();
    }
}

/// A partial write against a job record, applied as one unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_completed_at: Option<DateTime<Utc>>,
}

impl JobUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn with_error(mut self, error: JobError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_media(mut self, media: MediaInfo) -> Self {
        self.media = Some(media);
        self
    }

    pub fn with_result(mut self, result: AnalysisResult) -> Self {
        self.result = Some(result);
        self
    }

    pub fn started_now(mut self) -> Self {
        self.processing_started_at = Some(Utc::now());
        self
    }

    pub fn completed_now(mut self) -> Self {
        self.processing_completed_at = Some(Utc::now());
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
