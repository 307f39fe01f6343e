//! Local video files.
//!
//! `VideoFileSource` decodes a local video into RGB frames and
//! `VideoFileSink` encodes annotated frames back at the source rate and
//! resolution. Both accept `stub://` paths, which select an in-process
//! synthetic clip (source) or a frame counter (sink) so the video path can be
//! exercised without FFmpeg:
//!
//! `stub://lobby?frames=120&width=640&height=480&fps=30`
//!
//! Real files require the `video-ffmpeg` feature. Remote URLs are rejected.

use anyhow::{anyhow, Context, Result};

#[cfg(feature = "video-ffmpeg")]
use super::file_ffmpeg::{FfmpegFileSink, FfmpegFileSource};
use super::{FrameSink, FrameSource, StreamInfo};
use crate::frame::Frame;

pub const SYNTHETIC_SCHEME: &str = "stub://";

/// Video file frame source.
pub struct VideoFileSource {
    backend: SourceBackend,
}

enum SourceBackend {
    Synthetic(SyntheticClip),
    #[cfg(feature = "video-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl VideoFileSource {
    pub fn open(path: &str) -> Result<Self> {
        ensure_local(path)?;
        if path.starts_with(SYNTHETIC_SCHEME) {
            return Ok(Self {
                backend: SourceBackend::Synthetic(SyntheticClip::parse(path)?),
            });
        }
        #[cfg(feature = "video-ffmpeg")]
        {
            Ok(Self {
                backend: SourceBackend::Ffmpeg(FfmpegFileSource::open(path)?),
            })
        }
        #[cfg(not(feature = "video-ffmpeg"))]
        {
            Err(anyhow!(
                "decoding '{}' requires the video-ffmpeg feature",
                path
            ))
        }
    }

    /// Frames decoded so far.
    pub fn frames_read(&self) -> u64 {
        match &self.backend {
            SourceBackend::Synthetic(clip) => clip.emitted,
            #[cfg(feature = "video-ffmpeg")]
            SourceBackend::Ffmpeg(source) => source.frames_read(),
        }
    }
}

impl FrameSource for VideoFileSource {
    fn info(&self) -> StreamInfo {
        match &self.backend {
            SourceBackend::Synthetic(clip) => clip.info,
            #[cfg(feature = "video-ffmpeg")]
            SourceBackend::Ffmpeg(source) => source.info(),
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            SourceBackend::Synthetic(clip) => Ok(clip.next_frame()),
            #[cfg(feature = "video-ffmpeg")]
            SourceBackend::Ffmpeg(source) => source.next_frame(),
        }
    }
}

/// Video file frame sink.
pub struct VideoFileSink {
    backend: SinkBackend,
}

enum SinkBackend {
    Counter { path: String, written: u64 },
    #[cfg(feature = "video-ffmpeg")]
    Ffmpeg(FfmpegFileSink),
}

impl VideoFileSink {
    /// Create the output for frames shaped like `info`.
    pub fn create(path: &str, info: StreamInfo) -> Result<Self> {
        ensure_local(path)?;
        if path.starts_with(SYNTHETIC_SCHEME) {
            return Ok(Self {
                backend: SinkBackend::Counter {
                    path: path.to_string(),
                    written: 0,
                },
            });
        }
        #[cfg(feature = "video-ffmpeg")]
        {
            Ok(Self {
                backend: SinkBackend::Ffmpeg(FfmpegFileSink::create(path, info)?),
            })
        }
        #[cfg(not(feature = "video-ffmpeg"))]
        {
            let _ = info;
            Err(anyhow!(
                "encoding '{}' requires the video-ffmpeg feature",
                path
            ))
        }
    }

    pub fn frames_written(&self) -> u64 {
        match &self.backend {
            SinkBackend::Counter { written, .. } => *written,
            #[cfg(feature = "video-ffmpeg")]
            SinkBackend::Ffmpeg(sink) => sink.frames_written(),
        }
    }
}

impl FrameSink for VideoFileSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        match &mut self.backend {
            SinkBackend::Counter { written, .. } => {
                let _ = frame;
                *written += 1;
                Ok(())
            }
            #[cfg(feature = "video-ffmpeg")]
            SinkBackend::Ffmpeg(sink) => sink.write_frame(frame),
        }
    }

    fn finish(&mut self) -> Result<()> {
        match &mut self.backend {
            SinkBackend::Counter { path, written } => {
                log::info!("VideoFileSink: {} received {} frame(s)", path, written);
                Ok(())
            }
            #[cfg(feature = "video-ffmpeg")]
            SinkBackend::Ffmpeg(sink) => sink.finish(),
        }
    }
}

fn ensure_local(path: &str) -> Result<()> {
    if path.trim().is_empty() {
        return Err(anyhow!("video path is empty"));
    }
    if !path.starts_with(SYNTHETIC_SCHEME) && path.contains("://") {
        return Err(anyhow!(
            "video files must be local paths (no URL schemes): {}",
            path
        ));
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// Synthetic clip (stub://) for tests and the demo
// ----------------------------------------------------------------------------

struct SyntheticClip {
    info: StreamInfo,
    frames: u64,
    emitted: u64,
}

impl SyntheticClip {
    fn parse(path: &str) -> Result<Self> {
        let mut info = StreamInfo {
            width: 640,
            height: 480,
            frame_rate: 25.0,
            frame_count_hint: None,
        };
        let mut frames = 90;
        let query = path.split_once('?').map(|(_, query)| query).unwrap_or("");
        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("malformed stub parameter '{}'", pair))?;
            let bad = || format!("invalid stub parameter {}={}", key, value);
            match key {
                "frames" => frames = value.parse().with_context(bad)?,
                "width" => info.width = value.parse().with_context(bad)?,
                "height" => info.height = value.parse().with_context(bad)?,
                "fps" => info.frame_rate = value.parse().with_context(bad)?,
                other => return Err(anyhow!("unknown stub parameter '{}'", other)),
            }
        }
        if info.width == 0 || info.height == 0 {
            return Err(anyhow!("stub clip must have a non-zero size"));
        }
        if info.frame_rate.is_nan() || info.frame_rate <= 0.0 {
            return Err(anyhow!("stub clip frame rate must be positive"));
        }
        info.frame_count_hint = Some(frames);
        log::info!(
            "VideoFileSource: connected to {} (synthetic, {} frames)",
            path,
            frames
        );
        Ok(Self {
            info,
            frames,
            emitted: 0,
        })
    }

    fn next_frame(&mut self) -> Option<Frame> {
        if self.emitted >= self.frames {
            return None;
        }
        let shade = (self.emitted % 200) as u8;
        let frame = Frame::filled(self.info.width, self.info.height, [shade, 96, 255 - shade]);
        self.emitted += 1;
        Some(frame)
    }
}
