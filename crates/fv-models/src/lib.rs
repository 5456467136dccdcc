//! Shared data models for the ForensiVision backend.
//!
//! This crate provides Serde-serializable types for:
//! - Job records, status transitions and stage labels
//! - Error codes surfaced to API pollers
//! - Source descriptors and URL normalization
//! - Per-frame scores, segments and final analysis results

pub mod analysis;
pub mod error_code;
pub mod job;
pub mod source;

// Re-export common types
pub use analysis::{
    AnalysisOptions, AnalysisProfile, AnalysisResult, DetailLevel, FrameScore, MediaInfo,
    RiskLevel, Segment, TimelinePoint, Verdict, VerdictLean,
};
pub use error_code::{ErrorCode, JobError};
pub use job::{JobId, JobRecord, JobStatus, JobUpdate, Stage};
pub use source::{normalize_source_url, ResolvedSource, SourceDescriptor, SourceError, SourceKind};
