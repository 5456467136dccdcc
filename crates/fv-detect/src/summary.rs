//! Deterministic summary text.

use fv_models::Verdict;

use crate::aggregate::ScoreAggregate;

fn opening(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::AiGenerated => "This video shows strong indicators of AI-generated content.",
        Verdict::LikelyAi => "This video shows moderate indicators of AI-generated content.",
        Verdict::Inconclusive => "The analysis was inconclusive.",
        Verdict::LikelyAuthentic => "This video appears to be mostly authentic.",
        Verdict::Authentic => "This video appears to be authentic.",
    }
}

/// Build the summary from the verdict, aggregates and source duration.
pub fn summarize(verdict: Verdict, aggregate: &ScoreAggregate, duration_seconds: f64) -> String {
    let mut parts = vec![
        opening(verdict).to_string(),
        format!(
            "Analyzed {} frames over {:.0} seconds.",
            aggregate.frame_count,
            duration_seconds.max(0.0)
        ),
    ];

    if aggregate.suspicious_count > 0 {
        parts.push(format!(
            "{} frames ({:.0}%) showed elevated AI probability.",
            aggregate.suspicious_count,
            aggregate.suspicious_percent()
        ));
    }

    let segments = aggregate.segment_count();
    if segments > 0 {
        parts.push(format!("Found {} suspicious segment(s).", segments));
    }

    parts.join(" ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::tests::scores;
    use crate::aggregate::{aggregate_scores, AggregationConfig};

    #[test]
    fn test_summary_with_segments() {
        let points: Vec<(f64, f64)> = (0..10)
            .map(|t| (t as f64, if t < 5 { 0.1 } else { 0.8 }))
            .collect();
        let agg = aggregate_scores(&scores(&points), &AggregationConfig::default());
        let text = summarize(Verdict::LikelyAi, &agg, 10.2);
        assert_eq!(
            text,
            "This video shows moderate indicators of AI-generated content. \
             Analyzed 10 frames over 10 seconds. \
             5 frames (50%) showed elevated AI probability. \
             Found 1 suspicious segment(s)."
        );
    }

    #[test]
    fn test_summary_clean_video() {
        let agg = aggregate_scores(&scores(&[(0.0, 0.1), (1.0, 0.1)]), &AggregationConfig::default());
        assert_eq!(
            summarize(Verdict::Authentic, &agg, 2.0),
            "This video appears to be authentic. Analyzed 2 frames over 2 seconds."
        );
    }
}
