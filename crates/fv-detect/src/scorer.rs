//! The frame scoring capability.
//!
//! Adapters implement [`FrameScorer`] and return a tagged [`ScorerOutput`].
//! [`score_frame`] bounds each call with a timeout and normalizes the output
//! to a single AI-probability.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use fv_media::Frame;
use fv_models::{DetailLevel, FrameScore, Verdict, VerdictLean};

use crate::error::{DetectError, DetectResult};

/// Per-job options passed through to adapters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreOptions {
    pub detail_level: DetailLevel,
}

/// What an adapter reports for one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ScorerOutput {
    /// The adapter already produces a unified probability.
    Probability {
        ai_probability: f64,
        confidence: Option<f64>,
    },
    /// The adapter produces a verdict label with a confidence.
    Labeled { label: Verdict, confidence: f64 },
}

/// Detection capability applied to each sampled frame.
#[async_trait]
pub trait FrameScorer: Send + Sync {
    async fn score(&self, frame: &Frame, options: &ScoreOptions) -> DetectResult<ScorerOutput>;

    /// Adapter name recorded on the result.
    fn name(&self) -> &'static str;
}

const RANGE_TOLERANCE: f64 = 1e-9;

fn unit_interval(value: f64, what: &str) -> DetectResult<f64> {
    if !value.is_finite() || value < -RANGE_TOLERANCE || value > 1.0 + RANGE_TOLERANCE {
        return Err(DetectError::invalid_output(format!(
            "{} {} outside [0, 1]",
            what, value
        )));
    }
    Ok(value.clamp(0.0, 1.0))
}

/// Convert adapter output into `(probability, label, confidence)`.
///
/// Labeled output maps synthetic-leaning labels to `confidence`,
/// authentic-leaning labels to `1 - confidence`, and ambiguous labels to 0.5.
pub fn normalize_output(output: &ScorerOutput) -> DetectResult<(f64, Verdict, f64)> {
    match *output {
        ScorerOutput::Probability {
            ai_probability,
            confidence,
        } => {
            let p = unit_interval(ai_probability, "probability")?;
            let confidence = match confidence {
                Some(c) => unit_interval(c, "confidence")?,
                None => p.max(1.0 - p),
            };
            Ok((p, Verdict::from_probability(p), confidence))
        }
        ScorerOutput::Labeled { label, confidence } => {
            let c = unit_interval(confidence, "confidence")?;
            let p = match label.lean() {
                VerdictLean::Synthetic => c,
                VerdictLean::Authentic => 1.0 - c,
                VerdictLean::Ambiguous => 0.5,
            };
            Ok((p, label, c))
        }
    }
}

/// Score one frame, bounded by `timeout`.
pub async fn score_frame(
    scorer: &dyn FrameScorer,
    frame: &Frame,
    options: &ScoreOptions,
    timeout: Duration,
) -> DetectResult<FrameScore> {
    let output = tokio::time::timeout(timeout, scorer.score(frame, options))
        .await
        .map_err(|_| DetectError::Timeout {
            index: frame.index,
            timeout,
        })??;

    let (ai_probability, label, confidence) = normalize_output(&output)?;
    debug!(
        frame = frame.index,
        timestamp = frame.timestamp,
        ai_probability,
        "Scored frame with {}",
        scorer.name()
    );
    Ok(FrameScore {
        index: frame.index,
        timestamp: frame.timestamp,
        ai_probability,
        label,
        confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn frame(index: u64) -> Frame {
        Frame {
            index,
            timestamp: index as f64 / 30.0,
            image: RgbImage::new(2, 2),
        }
    }

    struct FixedScorer(ScorerOutput);

    #[async_trait]
    impl FrameScorer for FixedScorer {
        async fn score(&self, _frame: &Frame, _options: &ScoreOptions) -> DetectResult<ScorerOutput> {
            Ok(self.0.clone())
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    struct SlowScorer;

    #[async_trait]
    impl FrameScorer for SlowScorer {
        async fn score(&self, _frame: &Frame, _options: &ScoreOptions) -> DetectResult<ScorerOutput> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(ScorerOutput::Probability {
                ai_probability: 0.5,
                confidence: None,
            })
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    #[test]
    fn test_normalize_labeled() {
        let synthetic = ScorerOutput::Labeled {
            label: Verdict::LikelyAi,
            confidence: 0.8,
        };
        assert_eq!(normalize_output(&synthetic).unwrap().0, 0.8);

        let authentic = ScorerOutput::Labeled {
            label: Verdict::Authentic,
            confidence: 0.75,
        };
        assert!((normalize_output(&authentic).unwrap().0 - 0.25).abs() < 1e-12);

        let ambiguous = ScorerOutput::Labeled {
            label: Verdict::Inconclusive,
            confidence: 0.99,
        };
        assert_eq!(normalize_output(&ambiguous).unwrap().0, 0.5);
    }

    #[test]
    fn test_normalize_probability() {
        let out = ScorerOutput::Probability {
            ai_probability: 0.9,
            confidence: None,
        };
        let (p, label, confidence) = normalize_output(&out).unwrap();
        assert_eq!(p, 0.9);
        assert_eq!(label, Verdict::AiGenerated);
        assert_eq!(confidence, 0.9);
    }

    #[test]
    fn test_normalize_rejects_out_of_range() {
        for bad in [f64::NAN, -0.2, 1.5, f64::INFINITY] {
            let out = ScorerOutput::Probability {
                ai_probability: bad,
                confidence: None,
            };
            assert!(matches!(
                normalize_output(&out),
                Err(DetectError::InvalidOutput(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_rescoring_is_idempotent() {
        let scorer = FixedScorer(ScorerOutput::Labeled {
            label: Verdict::LikelyAuthentic,
            confidence: 0.7,
        });
        let f = frame(30);
        let opts = ScoreOptions::default();
        let a = score_frame(&scorer, &f, &opts, Duration::from_secs(1)).await.unwrap();
        let b = score_frame(&scorer, &f, &opts, Duration::from_secs(1)).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.index, 30);
        assert!((a.timestamp - 1.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_timeout_is_scoring_error() {
        let err = score_frame(
            &SlowScorer,
            &frame(0),
            &ScoreOptions::default(),
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DetectError::Timeout { index: 0, .. }));
        assert_eq!(err.code(), fv_models::ErrorCode::ScoringError);
    }
}
