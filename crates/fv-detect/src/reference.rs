//! Deterministic reference scorer.
//!
//! Scores frames from luminance statistics: overall exposure balance and
//! how much fine texture (Laplacian response) a frame carries relative to
//! its contrast. Its numbers are illustrative and carry no forensic weight;
//! it exists so the pipeline runs end to end without a model backend.

use async_trait::async_trait;
use image::RgbImage;

use fv_media::Frame;
use fv_models::{Verdict, VerdictLean};

use crate::error::{DetectError, DetectResult};
use crate::scorer::{FrameScorer, ScoreOptions, ScorerOutput};

/// Longest side of the analysis grid.
const GRID_MAX: u32 = 256;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct LumaStats {
    pub mean: f64,
    pub std_dev: f64,
    pub laplacian: f64,
}

/// Statistics-only scorer. Runs on the blocking pool.
#[derive(Debug, Clone, Default)]
pub struct StatisticalScorer;

impl StatisticalScorer {
    pub fn new() -> Self {
        Self
    }

    /// Synthetic-likelihood from stats, in [0, 1].
    pub(crate) fn probability(stats: &LumaStats) -> f64 {
        // Natural footage carries fine texture relative to its contrast
        let ratio = (stats.laplacian / (stats.std_dev + 1.0)).min(4.0);
        let smoothness = 1.0 - ratio / 4.0;
        let exposure_balance = 1.0 - ((stats.mean - 128.0) / 128.0).abs().min(1.0);
        (0.75 * smoothness + 0.25 * exposure_balance).clamp(0.0, 1.0)
    }

    fn label(p: f64) -> (Verdict, f64) {
        let label = Verdict::from_probability(p);
        let confidence = match label.lean() {
            VerdictLean::Synthetic => p,
            VerdictLean::Authentic => 1.0 - p,
            VerdictLean::Ambiguous => p.max(1.0 - p),
        };
        (label, confidence)
    }
}

pub(crate) fn luma_stats(image: &RgbImage) -> Option<LumaStats> {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return None;
    }
    let step = (w.max(h) / GRID_MAX).max(1);
    let gw = w.div_ceil(step) as usize;
    let gh = h.div_ceil(step) as usize;

    let mut grid = Vec::with_capacity(gw * gh);
    for gy in 0..gh {
        for gx in 0..gw {
            let px = image.get_pixel(gx as u32 * step, gy as u32 * step);
            let [r, g, b] = px.0;
            grid.push(0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64);
        }
    }

    let n = grid.len() as f64;
    let mean = grid.iter().sum::<f64>() / n;
    let variance = grid.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

    let mut lap_sum = 0.0;
    let mut lap_count = 0usize;
    for y in 1..gh.saturating_sub(1) {
        for x in 1..gw.saturating_sub(1) {
            let c = grid[y * gw + x];
            let lap = grid[(y - 1) * gw + x]
                + grid[(y + 1) * gw + x]
                + grid[y * gw + x - 1]
                + grid[y * gw + x + 1]
                - 4.0 * c;
            lap_sum += lap.abs();
            lap_count += 1;
        }
    }

    Some(LumaStats {
        mean,
        std_dev: variance.sqrt(),
        laplacian: if lap_count > 0 {
            lap_sum / lap_count as f64
        } else {
            0.0
        },
    })
}

#[async_trait]
impl FrameScorer for StatisticalScorer {
    async fn score(&self, frame: &Frame, _options: &ScoreOptions) -> DetectResult<ScorerOutput> {
        let image = frame.image.clone();
        let stats = tokio::task::spawn_blocking(move || luma_stats(&image))
            .await
            .map_err(|e| DetectError::scorer_failed(format!("scoring task failed: {}", e)))?
            .ok_or_else(|| DetectError::scorer_failed("empty frame"))?;

        let (label, confidence) = Self::label(Self::probability(&stats));
        Ok(ScorerOutput::Labeled { label, confidence })
    }

    fn name(&self) -> &'static str {
        "statistical"
    }
}
