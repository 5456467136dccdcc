//! Frame scoring and verdict derivation.
//!
//! This crate provides:
//! - The [`FrameScorer`] capability with a tagged output type
//! - Label/confidence normalization and per-frame timeouts
//! - A deterministic reference scorer based on image statistics
//! - Segment aggregation, the verdict decision table and summary text

pub mod aggregate;
pub mod error;
pub mod reference;
pub mod report;
pub mod scorer;
pub mod summary;
pub mod verdict;

pub use aggregate::{aggregate_scores, build_segments, AggregationConfig, ScoreAggregate};
pub use error::{DetectError, DetectResult};
pub use reference::StatisticalScorer;
pub use report::{build_result, ReportContext};
pub use scorer::{normalize_output, score_frame, FrameScorer, ScoreOptions, ScorerOutput};
pub use summary::summarize;
pub use verdict::{decide, Decision};
