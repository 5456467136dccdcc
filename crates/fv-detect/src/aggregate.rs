//! Segment formation and global aggregates.

use fv_models::{FrameScore, Segment};

/// Thresholds for the suspicious predicate and segment merging.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregationConfig {
    /// A frame is suspicious iff `probability >= suspicious_threshold`
    pub suspicious_threshold: f64,
    /// Max gap in seconds between consecutive members of one segment
    pub segment_gap_secs: f64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            suspicious_threshold: 0.65,
            segment_gap_secs: 3.0,
        }
    }
}

impl AggregationConfig {
    pub fn is_suspicious(&self, probability: f64) -> bool {
        probability >= self.suspicious_threshold
    }
}

/// Global aggregates over one job's frame scores.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreAggregate {
    /// Mean probability over all frames (A)
    pub mean: f64,
    /// Max probability over all frames (M)
    pub max: f64,
    pub segments: Vec<Segment>,
    pub frame_count: usize,
    pub suspicious_count: usize,
}

impl ScoreAggregate {
    /// S
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn suspicious_percent(&self) -> f64 {
        if self.frame_count == 0 {
            0.0
        } else {
            self.suspicious_count as f64 / self.frame_count as f64 * 100.0
        }
    }
}

struct OpenSegment {
    start: f64,
    last: f64,
    sum: f64,
    count: usize,
}

impl OpenSegment {
    fn close(self) -> Segment {
        Segment {
            start: self.start,
            end: self.last,
            avg_probability: self.sum / self.count as f64,
            frame_count: self.count,
        }
    }
}

/// Merge temporally close suspicious frames into segments.
///
/// `scores` must be ordered by timestamp. A suspicious frame extends the
/// open segment when it is within `segment_gap_secs` of the segment's last
/// member; a larger gap or any non-suspicious frame closes it.
pub fn build_segments(scores: &[FrameScore], config: &AggregationConfig) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut open: Option<OpenSegment> = None;

    for score in scores {
        if !config.is_suspicious(score.ai_probability) {
            if let Some(seg) = open.take() {
                segments.push(seg.close());
            }
            continue;
        }

        match open.as_mut() {
            Some(seg) if score.timestamp - seg.last <= config.segment_gap_secs => {
                seg.last = score.timestamp;
                seg.sum += score.ai_probability;
                seg.count += 1;
            }
            _ => {
                if let Some(seg) = open.take() {
                    segments.push(seg.close());
                }
                open = Some(OpenSegment {
                    start: score.timestamp,
                    last: score.timestamp,
                    sum: score.ai_probability,
                    count: 1,
                });
            }
        }
    }

    if let Some(seg) = open {
        segments.push(seg.close());
    }
    segments
}

/// Compute A, M, segments and suspicious counts. Zero frames is not an error.
pub fn aggregate_scores(scores: &[FrameScore], config: &AggregationConfig) -> ScoreAggregate {
    let frame_count = scores.len();
    let (mean, max) = if frame_count == 0 {
        (0.0, 0.0)
    } else {
        let sum: f64 = scores.iter().map(|s| s.ai_probability).sum();
        let max = scores
            .iter()
            .map(|s| s.ai_probability)
            .fold(0.0_f64, f64::max);
        (sum / frame_count as f64, max)
    };

    ScoreAggregate {
        mean,
        max,
        segments: build_segments(scores, config),
        frame_count,
        suspicious_count: scores
            .iter()
            .filter(|s| config.is_suspicious(s.ai_probability))
            .count(),
    }
}
