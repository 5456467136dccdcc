//! Assemble the final `AnalysisResult` from frame scores.

use fv_models::{AnalysisResult, DetailLevel, FrameScore, TimelinePoint};

use crate::aggregate::{aggregate_scores, AggregationConfig};
use crate::summary::summarize;
use crate::verdict::decide;

/// Job-level context carried into the result.
#[derive(Debug, Clone)]
pub struct ReportContext {
    pub source_id: String,
    pub title: String,
    pub duration_seconds: f64,
    pub scorer: String,
    pub detail_level: DetailLevel,
    pub aggregation: AggregationConfig,
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

/// Aggregate, decide and summarize in one pass.
pub fn build_result(scores: &[FrameScore], ctx: &ReportContext) -> AnalysisResult {
    let aggregate = aggregate_scores(scores, &ctx.aggregation);
    let decision = decide(aggregate.mean, aggregate.max, aggregate.segment_count());
    let summary = summarize(decision.verdict, &aggregate, ctx.duration_seconds);

    let timeline = match ctx.detail_level {
        DetailLevel::Full => Some(
            scores
                .iter()
                .map(|s| TimelinePoint {
                    timestamp: s.timestamp,
                    ai_probability: round3(s.ai_probability),
                })
                .collect(),
        ),
        DetailLevel::Summary => None,
    };

    AnalysisResult {
        verdict: decision.verdict,
        confidence: decision.confidence,
        risk_level: decision.risk,
        summary,
        frame_count: aggregate.frame_count,
        suspicious_frame_count: aggregate.suspicious_count,
        mean_probability: aggregate.mean,
        max_probability: aggregate.max,
        segments: aggregate.segments,
        source_id: ctx.source_id.clone(),
        title: ctx.title.clone(),
        duration_seconds: ctx.duration_seconds,
        scorer: ctx.scorer.clone(),
        timeline,
    }
}
