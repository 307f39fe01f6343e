use std::collections::VecDeque;

use anyhow::{anyhow, bail, Result};

use super::{FrameSink, FrameSource, StreamInfo, DEFAULT_FRAME_RATE};
use crate::frame::Frame;

/// Source over frames already in memory.
pub struct MemorySource {
    frames: VecDeque<Frame>,
    info: StreamInfo,
    fail_at: Option<u64>,
    yielded: u64,
}

impl MemorySource {
    pub fn new(frames: Vec<Frame>) -> Self {
        let (width, height) = frames
            .first()
            .map(|frame| (frame.width(), frame.height()))
            .unwrap_or((0, 0));
        let info = StreamInfo {
            width,
            height,
            frame_rate: DEFAULT_FRAME_RATE,
            frame_count_hint: Some(frames.len() as u64),
        };
        Self {
            frames: frames.into(),
            info,
            fail_at: None,
            yielded: 0,
        }
    }

    pub fn with_frame_rate(mut self, frame_rate: f64) -> Self {
        self.info.frame_rate = frame_rate;
        self
    }

    /// Fail the read of zero-based frame `index` instead of yielding it.
    pub fn failing_at(mut self, index: u64) -> Self {
        self.fail_at = Some(index);
        self
    }
}

impl FrameSource for MemorySource {
    fn info(&self) -> StreamInfo {
        self.info
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.fail_at == Some(self.yielded) {
            bail!("read error at frame {}", self.yielded);
        }
        let frame = self.frames.pop_front();
        if frame.is_some() {
            self.yielded += 1;
        }
        Ok(frame)
    }
}

/// Sink that keeps every frame it receives.
#[derive(Default)]
pub struct MemorySink {
    frames: Vec<Frame>,
    finished: bool,
    reject_at: Option<usize>,
    fail_finish: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the write of zero-based frame `index`.
    pub fn rejecting_at(mut self, index: usize) -> Self {
        self.reject_at = Some(index);
        self
    }

    pub fn failing_finish(mut self) -> Self {
        self.fail_finish = true;
        self
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl FrameSink for MemorySink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if self.finished {
            bail!("write after finish");
        }
        if self.reject_at == Some(self.frames.len()) {
            return Err(anyhow!("sink full at frame {}", self.frames.len()));
        }
        self.frames.push(frame.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        if self.fail_finish {
            bail!("flush failed");
        }
        Ok(())
    }
}

/// Sink that only counts frames.
#[derive(Debug, Default)]
pub struct DiscardSink {
    written: u64,
}

impl DiscardSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl FrameSink for DiscardSink {
    fn write_frame(&mut self, _frame: &Frame) -> Result<()> {
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_reports_geometry_and_drains() {
        let mut source = MemorySource::new(vec![Frame::filled(4, 3, [1, 2, 3]); 2]);
        assert_eq!(source.info().width, 4);
        assert_eq!(source.info().frame_count_hint, Some(2));
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn sink_refuses_writes_after_finish() {
        let mut sink = MemorySink::new();
        sink.write_frame(&Frame::filled(1, 1, [0, 0, 0])).unwrap();
        sink.finish().unwrap();
        assert!(sink.write_frame(&Frame::filled(1, 1, [0, 0, 0])).is_err());
        assert_eq!(sink.frames().len(), 1);
    }
}
