//! Analysis inputs and outputs: options, media metadata, frame scores,
//! segments and the final per-job result.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Limit profile a job runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisProfile {
    #[default]
    Standard,
    /// Constrained limits for the low-latency path
    Demo,
}

impl AnalysisProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisProfile::Standard => "standard",
            AnalysisProfile::Demo => "demo",
        }
    }
}

/// How much per-frame detail ends up in the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum DetailLevel {
    #[default]
    Summary,
    /// Include the per-frame probability timeline
    Full,
}

impl DetailLevel {
    /// Unknown values fall back to `Summary`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => DetailLevel::Full,
            _ => DetailLevel::Summary,
        }
    }
}

/// Per-job options supplied by the API layer. All optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisOptions {
    /// Target sampling rate in frames per second
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling_rate: Option<f64>,
    /// Requested duration ceiling in seconds; may only tighten the profile ceiling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail_level: Option<String>,
}

impl AnalysisOptions {
    pub fn detail_level(&self) -> DetailLevel {
        self.detail_level
            .as_deref()
            .map(DetailLevel::parse)
            .unwrap_or_default()
    }
}

/// Media metadata recorded on the job after acquisition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MediaInfo {
    pub source_id: String,
    pub title: String,
    pub duration_seconds: f64,
    /// e.g. "720p"
    pub resolution: String,
    pub fps: f64,
    pub size_bytes: u64,
}

/// Final categorical judgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    AiGenerated,
    LikelyAi,
    Inconclusive,
    LikelyAuthentic,
    Authentic,
}

/// Which way a label leans when converting it to a probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictLean {
    Synthetic,
    Authentic,
    Ambiguous,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::AiGenerated => "ai_generated",
            Verdict::LikelyAi => "likely_ai",
            Verdict::Inconclusive => "inconclusive",
            Verdict::LikelyAuthentic => "likely_authentic",
            Verdict::Authentic => "authentic",
        }
    }

    pub fn lean(&self) -> VerdictLean {
        match self {
            Verdict::AiGenerated | Verdict::LikelyAi => VerdictLean::Synthetic,
            Verdict::LikelyAuthentic | Verdict::Authentic => VerdictLean::Authentic,
            Verdict::Inconclusive => VerdictLean::Ambiguous,
        }
    }

    /// Per-frame label for a bare probability.
    pub fn from_probability(p: f64) -> Self {
        if p > 0.85 {
            Verdict::AiGenerated
        } else if p > 0.65 {
            Verdict::LikelyAi
        } else if p > 0.35 {
            Verdict::Inconclusive
        } else if p > 0.15 {
            Verdict::LikelyAuthentic
        } else {
            Verdict::Authentic
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coarse severity bucket derived from the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

/// Score for a single sampled frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FrameScore {
    pub index: u64,
    pub timestamp: f64,
    /// Normalized to [0, 1]
    pub ai_probability: f64,
    pub label: Verdict,
    pub confidence: f64,
}

/// A maximal run of temporally close suspicious frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub avg_probability: f64,
    pub frame_count: usize,
}

impl Segment {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TimelinePoint {
    pub timestamp: f64,
    pub ai_probability: f64,
}

/// Final result stored once on a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisResult {
    pub verdict: Verdict,
    pub confidence: f64,
    pub risk_level: RiskLevel,
    pub summary: String,
    pub segments: Vec<Segment>,
    pub frame_count: usize,
    pub suspicious_frame_count: usize,
    pub mean_probability: f64,
    pub max_probability: f64,
    pub source_id: String,
    pub title: String,
    pub duration_seconds: f64,
    /// Name of the scoring adapter that produced the frame scores
    pub scorer: String,
    /// Present only for `detail_level = full`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeline: Option<Vec<TimelinePoint>>,
}
