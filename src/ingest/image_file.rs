//! Still images read and written with the `image` crate.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use super::{FrameSink, FrameSource, StreamInfo};
use crate::frame::Frame;

/// Decodes one image file into a single frame.
pub struct ImageFileSource {
    path: PathBuf,
    frame: Option<Frame>,
    info: StreamInfo,
}

impl ImageFileSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let image = image::open(&path)
            .with_context(|| format!("failed to decode image {}", path.display()))?
            .to_rgb8();
        let frame = Frame::from_image(image);
        let info = StreamInfo::still(frame.width(), frame.height());
        log::info!(
            "ImageFileSource: opened {} ({}x{})",
            path.display(),
            info.width,
            info.height
        );
        Ok(Self {
            path,
            frame: Some(frame),
            info,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSource for ImageFileSource {
    fn info(&self) -> StreamInfo {
        self.info
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        Ok(self.frame.take())
    }
}

/// Writes exactly one frame; format chosen from the file extension.
pub struct ImageFileSink {
    path: PathBuf,
    written: bool,
}

impl ImageFileSink {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        Ok(Self {
            path,
            written: false,
        })
    }
}

impl FrameSink for ImageFileSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if self.written {
            bail!("{} already holds an image", self.path.display());
        }
        frame
            .clone()
            .into_image()
            .save(&self.path)
            .with_context(|| format!("failed to write image {}", self.path.display()))?;
        self.written = true;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.written {
            log::info!("ImageFileSink: wrote {}", self.path.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_round_trip_is_lossless() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.png");
        let frame = Frame::filled(5, 4, [10, 200, 30]);

        let mut sink = ImageFileSink::create(&path).unwrap();
        sink.write_frame(&frame).unwrap();
        assert!(sink.write_frame(&frame).is_err());
        sink.finish().unwrap();

        let mut source = ImageFileSource::open(&path).unwrap();
        assert_eq!(source.info().frame_count_hint, Some(1));
        assert_eq!(source.next_frame().unwrap(), Some(frame));
        assert_eq!(source.next_frame().unwrap(), None);
    }

    #[test]
    fn unreadable_image_is_an_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"not an image").unwrap();
        assert!(ImageFileSource::open(file.path()).is_err());
    }
}
