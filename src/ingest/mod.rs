//! Frame sources and sinks.
//!
//! Sources yield decoded RGB frames in presentation order; sinks receive the
//! annotated frames in the same order. Provided here:
//! - In-memory source and sinks (tests, embedding)
//! - Still images via the `image` crate
//! - Local video files: `stub://` synthetic clips, or FFmpeg
//!   (feature: video-ffmpeg)
//!
//! Sources never fetch remote URLs and never keep a frame after handing it
//! over.

use std::path::Path;

use anyhow::Result;
use serde::Serialize;

use crate::frame::Frame;

pub mod file;
#[cfg(feature = "video-ffmpeg")]
pub(crate) mod file_ffmpeg;
pub mod image_file;
pub mod memory;

pub use file::{VideoFileSink, VideoFileSource};
pub use image_file::{ImageFileSink, ImageFileSource};
pub use memory::{DiscardSink, MemorySink, MemorySource};

/// Frame rate assumed when a container does not report one.
pub const DEFAULT_FRAME_RATE: f64 = 25.0;

pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "tiff", "tif"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "flv", "wmv"];

/// Geometry and timing of a frame stream.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    /// Frame count reported by the container, when it reports one.
    pub frame_count_hint: Option<u64>,
}

impl StreamInfo {
    pub fn still(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frame_rate: DEFAULT_FRAME_RATE,
            frame_count_hint: Some(1),
        }
    }
}

/// Ordered producer of frames.
pub trait FrameSource {
    fn info(&self) -> StreamInfo;

    /// Next frame, or `None` once the stream is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Ordered consumer of annotated frames.
pub trait FrameSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Flush and close. Called exactly once, also after cancellation.
    fn finish(&mut self) -> Result<()>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn info(&self) -> StreamInfo {
        (**self).info()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        (**self).next_frame()
    }
}

impl<S: FrameSink + ?Sized> FrameSink for Box<S> {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        (**self).write_frame(frame)
    }

    fn finish(&mut self) -> Result<()> {
        (**self).finish()
    }
}

/// Whether an input is handled as a still image or as a video.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Classify by extension, case-insensitively. `stub://` inputs are
    /// synthetic videos. `None` for anything unsupported.
    pub fn from_path(path: &str) -> Option<Self> {
        if path.starts_with(file::SYNTHETIC_SCHEME) {
            return Some(MediaKind::Video);
        }
        let extension = Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())?
            .to_ascii_lowercase();
        if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            Some(MediaKind::Image)
        } else if VIDEO_EXTENSIONS.contains(&extension.as_str()) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }

    /// Output used when the caller does not name one.
    pub fn default_output(self) -> &'static str {
        match self {
            MediaKind::Image => "result.jpg",
            MediaKind::Video => "result.mp4",
        }
    }
}
