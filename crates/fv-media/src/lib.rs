//! Media acquisition and frame sampling.
//!
//! This crate provides:
//! - Source acquisition with duration/size/resolution policy (yt-dlp)
//! - Job-unique scratch directories removed on every exit path
//! - FFprobe metadata and FFmpeg raw frame decoding
//! - Rate-limited, timestamped frame sampling

pub mod acquire;
pub mod decode;
pub mod download;
pub mod error;
pub mod limits;
pub mod probe;
pub mod sampler;
pub mod scratch;

pub use acquire::{MediaHandle, ProbedSource, SourceAcquirer};
pub use decode::{FfmpegDecoder, FfmpegFrameSource};
pub use download::{CliFetcher, FetchTarget, SourceFetcher, SourceMetadata};
pub use error::{AcquireError, AcquireResult, MediaError, MediaResult};
pub use limits::AcquisitionLimits;
pub use probe::{probe_video, VideoInfo};
pub use sampler::{frame_interval, sample_frames, Frame, FrameDecoder, FrameSource, SamplingPlan};
pub use scratch::ScratchDir;
