//! FFmpeg-backed frame decoding.
//!
//! Frames are piped out of FFmpeg as raw RGB24 and read one frame's worth
//! of bytes at a time, optionally downscaled so the longest side fits
//! `max_dimension`.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use image::RgbImage;
use tokio::io::{AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{MediaError, MediaResult};
use crate::probe::probe_video;
use crate::sampler::{FrameDecoder, FrameSource};

/// Opens files with FFmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegDecoder {
    max_dimension: u32,
}

impl FfmpegDecoder {
    pub fn new(max_dimension: u32) -> Self {
        Self {
            max_dimension: max_dimension.max(16),
        }
    }
}

impl Default for FfmpegDecoder {
    fn default() -> Self {
        Self::new(512)
    }
}

#[async_trait]
impl FrameDecoder for FfmpegDecoder {
    async fn open(&self, path: &Path) -> MediaResult<Box<dyn FrameSource>> {
        let source = FfmpegFrameSource::spawn(path, self.max_dimension).await?;
        Ok(Box::new(source))
    }
}

/// Output size after fitting the longest side into `max_dimension`.
pub(crate) fn scaled_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_dimension {
        return (width, height);
    }
    let scale = max_dimension as f64 / longest as f64;
    let w = ((width as f64 * scale).round() as u32).max(1);
    let h = ((height as f64 * scale).round() as u32).max(1);
    (w, h)
}

/// A running FFmpeg process emitting raw RGB24 frames.
pub struct FfmpegFrameSource {
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr_task: Option<JoinHandle<String>>,
    width: u32,
    height: u32,
    fps: f64,
    buffer: Vec<u8>,
    finished: bool,
}

impl FfmpegFrameSource {
    pub async fn spawn(path: &Path, max_dimension: u32) -> MediaResult<Self> {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let info = probe_video(path).await?;
        if info.width == 0 || info.height == 0 {
            return Err(MediaError::invalid_video("video stream has no dimensions"));
        }
        let (width, height) = scaled_dimensions(info.width, info.height, max_dimension);

        let mut child = Command::new("ffmpeg")
            .args(["-v", "error", "-nostdin", "-noautorotate", "-i"])
            .arg(path)
            .args(["-map", "0:v:0", "-vf"])
            .arg(format!("scale={}:{}", width, height))
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::ffmpeg_failed("stdout not captured", None, None))?;

        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf).await;
                buf
            })
        });

        debug!(
            "Decoding {} at {}x{} ({:.3} fps)",
            path.display(),
            width,
            height,
            info.fps
        );

        Ok(Self {
            child,
            stdout: BufReader::new(stdout),
            stderr_task,
            width,
            height,
            fps: info.fps,
            buffer: vec![0u8; width as usize * height as usize * 3],
            finished: false,
        })
    }

    async fn collect_stderr(&mut self) -> Option<String> {
        match self.stderr_task.take() {
            Some(task) => task.await.ok().filter(|s| !s.trim().is_empty()),
            None => None,
        }
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    fn fps(&self) -> f64 {
        self.fps
    }

    async fn next_frame(&mut self) -> MediaResult<Option<RgbImage>> {
        if self.finished {
            return Ok(None);
        }

        match self.stdout.read_exact(&mut self.buffer).await {
            Ok(_) => {
                let image = RgbImage::from_raw(self.width, self.height, self.buffer.clone())
                    .ok_or_else(|| MediaError::invalid_video("frame buffer size mismatch"))?;
                Ok(Some(image))
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                // A partial trailing frame is dropped; exit status is checked in close()
                self.finished = true;
                Ok(None)
            }
            Err(e) => Err(MediaError::Io(e)),
        }
    }

    async fn close(&mut self) -> MediaResult<()> {
        if !self.finished {
            // Stopped early at the frame cap: the decoder is no longer needed
            self.child.start_kill().ok();
            self.child.wait().await.ok();
            if let Some(task) = self.stderr_task.take() {
                task.abort();
            }
            return Ok(());
        }

        let status = self.child.wait().await?;
        let stderr = self.collect_stderr().await;
        if !status.success() {
            return Err(MediaError::ffmpeg_failed(
                "FFmpeg could not decode the video",
                stderr,
                status.code(),
            ));
        }
        Ok(())
    }
}
