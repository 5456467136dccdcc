//! Rate-limited frame sampling.

use std::path::Path;

use async_trait::async_trait;
use image::RgbImage;
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// A decoded frame retained by the sampler.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Index of the frame in the decoded stream
    pub index: u64,
    /// `index / source_fps`, strictly increasing within a sequence
    pub timestamp: f64,
    pub image: RgbImage,
}

/// Sequential decoder over one media file.
#[async_trait]
pub trait FrameSource: Send {
    /// Native frame rate of the stream.
    fn fps(&self) -> f64;

    /// Next decoded frame, or `None` at end of stream.
    async fn next_frame(&mut self) -> MediaResult<Option<RgbImage>>;

    /// Release the decoder. Reports decode failures that surfaced at exit.
    async fn close(&mut self) -> MediaResult<()>;
}

/// Opens a [`FrameSource`] for a file.
#[async_trait]
pub trait FrameDecoder: Send + Sync {
    async fn open(&self, path: &Path) -> MediaResult<Box<dyn FrameSource>>;
}

/// Sampling parameters for one job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingPlan {
    /// Target frames per second
    pub rate: f64,
    /// Hard cap on retained frames
    pub max_frames: usize,
}

/// `max(1, round(source_fps / rate))`
pub fn frame_interval(source_fps: f64, rate: f64) -> u64 {
    if !(source_fps.is_finite() && rate.is_finite()) || source_fps <= 0.0 || rate <= 0.0 {
        return 1;
    }
    ((source_fps / rate).round() as u64).max(1)
}

/// Decode `source` sequentially and keep every `frame_interval`-th frame.
///
/// Stops at `plan.max_frames` or end of stream, whichever comes first. The
/// source is always closed before returning.
pub async fn sample_frames(
    source: &mut dyn FrameSource,
    plan: SamplingPlan,
) -> MediaResult<Vec<Frame>> {
    let result = collect_frames(source, plan).await;
    let closed = source.close().await;
    let frames = result?;
    closed?;
    Ok(frames)
}

async fn collect_frames(source: &mut dyn FrameSource, plan: SamplingPlan) -> MediaResult<Vec<Frame>> {
    let fps = source.fps();
    if !(fps.is_finite() && fps > 0.0) {
        return Err(MediaError::invalid_video(format!("unusable frame rate {}", fps)));
    }
    let interval = frame_interval(fps, plan.rate);

    debug!(
        "Sampling at {} fps from {:.3} fps source (every {} frames, max {})",
        plan.rate, fps, interval, plan.max_frames
    );

    let mut frames = Vec::with_capacity(plan.max_frames.min(1024));
    let mut index: u64 = 0;

    while frames.len() < plan.max_frames {
        let Some(image) = source.next_frame().await? else {
            break;
        };
        if index % interval == 0 {
            frames.push(Frame {
                index,
                timestamp: index as f64 / fps,
                image,
            });
        }
        index += 1;
    }

    Ok(frames)
}
