//! Media pipeline: detector and annotator driven over an image or a video.
//!
//! Frames are processed strictly in order and only the current frame is held
//! in memory. Each frame is written to the sink only after detection and
//! annotation finish. Per-frame counts are folded into an `OccupancyTally`;
//! the aggregate is its peak.

mod cancel;
mod tally;

pub use cancel::CancelToken;
pub use tally::OccupancyTally;

use serde::Serialize;

use crate::annotate::Annotator;
use crate::detect::{FrameResult, PeopleDetector};
use crate::error::PipelineError;
use crate::frame::Frame;
use crate::ingest::{FrameSink, FrameSource};

/// How a run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Completion {
    Finished,
    Cancelled { frames_processed: u64 },
}

/// Outcome of processing one image or video.
#[derive(Clone, Debug, Serialize)]
pub struct MediaResult {
    aggregate_count: usize,
    mean_count: f64,
    frames_processed: u64,
    completion: Completion,
    frame_results: Vec<FrameResult>,
}

impl MediaResult {
    fn from_tally(tally: OccupancyTally, frame_results: Vec<FrameResult>, completion: Completion) -> Self {
        Self {
            aggregate_count: tally.peak(),
            mean_count: tally.mean(),
            frames_processed: tally.frames(),
            completion,
            frame_results,
        }
    }

    /// Peak people count over all processed frames.
    pub fn aggregate_count(&self) -> usize {
        self.aggregate_count
    }

    pub fn mean_count(&self) -> f64 {
        self.mean_count
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn completion(&self) -> Completion {
        self.completion
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.completion, Completion::Cancelled { .. })
    }

    /// Per-frame results, in frame order.
    pub fn frame_results(&self) -> &[FrameResult] {
        &self.frame_results
    }
}

/// Reported after every processed video frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VideoProgress {
    /// Zero-based index of the frame just written.
    pub frame_index: u64,
    pub frame_count_hint: Option<u64>,
    /// People in this frame.
    pub frame_count: usize,
    /// Peak so far.
    pub peak: usize,
}

pub struct MediaPipeline {
    detector: Box<dyn PeopleDetector>,
    annotator: Annotator,
}

impl MediaPipeline {
    pub fn new(detector: Box<dyn PeopleDetector>, annotator: Annotator) -> Self {
        Self {
            detector,
            annotator,
        }
    }

    pub fn detector(&self) -> &dyn PeopleDetector {
        self.detector.as_ref()
    }

    pub fn annotator(&self) -> &Annotator {
        &self.annotator
    }

    /// Load the detector backend. Every `process_*` call does this on demand.
    pub fn load(&mut self) -> Result<(), PipelineError> {
        self.detector.load()
    }

    /// Detect once, annotate, and report the frame's count.
    pub fn process_image(&mut self, frame: Frame) -> Result<(Frame, MediaResult), PipelineError> {
        self.load()?;
        let result = self.detector.detect_people(&frame)?;
        let tally = OccupancyTally::default().observe(result.count());
        let annotated = self.annotator.annotate(frame, &result);
        log::info!(
            "image: {} people ({}x{})",
            result.count(),
            annotated.width(),
            annotated.height()
        );
        Ok((
            annotated,
            MediaResult::from_tally(tally, vec![result], Completion::Finished),
        ))
    }

    /// Read one frame from `source`, process it, write it to `sink`.
    ///
    /// A source with no frame is `EmptyMedia`.
    pub fn process_image_source(
        &mut self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
    ) -> Result<MediaResult, PipelineError> {
        let frame = source
            .next_frame()
            .map_err(|err| PipelineError::source(0, err))?
            .ok_or(PipelineError::EmptyMedia)?;
        let (annotated, result) = self.process_image(frame)?;
        sink.write_frame(&annotated)
            .map_err(|err| PipelineError::sink(0, err))?;
        sink.finish().map_err(|err| PipelineError::sink(0, err))?;
        Ok(result)
    }

    /// Process every frame of `source` in order, writing each annotated frame
    /// to `sink`.
    ///
    /// `cancel` is checked before each frame; a cancelled run still finishes
    /// the sink and returns `Completion::Cancelled` covering the frames done so
    /// far. On a fault the sink is finished best-effort and the fault returned.
    pub fn process_video<F>(
        &mut self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        cancel: &CancelToken,
        mut progress: F,
    ) -> Result<MediaResult, PipelineError>
    where
        F: FnMut(&VideoProgress),
    {
        self.load()?;
        let info = source.info();
        log::info!(
            "video: {}x{} @ {:.2} fps, {} frame(s) expected",
            info.width,
            info.height,
            info.frame_rate,
            info.frame_count_hint
                .map(|n| n.to_string())
                .unwrap_or_else(|| "unknown".to_string())
        );

        let mut tally = OccupancyTally::default();
        let mut frame_results = Vec::new();
        let outcome = loop {
            let frame_index = tally.frames();
            if cancel.is_cancelled() {
                break Ok(Completion::Cancelled {
                    frames_processed: frame_index,
                });
            }
            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break Ok(Completion::Finished),
                Err(err) => break Err(PipelineError::source(frame_index, err)),
            };
            let result = match self.detector.detect_people(&frame) {
                Ok(result) => result,
                Err(err) => break Err(err),
            };
            let annotated = self.annotator.annotate(frame, &result);
            if let Err(err) = sink.write_frame(&annotated) {
                break Err(PipelineError::sink(frame_index, err));
            }

            tally = tally.observe(result.count());
            log::debug!(
                "frame {}: {} people (peak {})",
                frame_index,
                result.count(),
                tally.peak()
            );
            progress(&VideoProgress {
                frame_index,
                frame_count_hint: info.frame_count_hint,
                frame_count: result.count(),
                peak: tally.peak(),
            });
            frame_results.push(result);
        };

        match outcome {
            Ok(completion) => {
                sink.finish()
                    .map_err(|err| PipelineError::sink(tally.frames(), err))?;
                log::info!(
                    "video: {} frame(s), peak {} people, mean {:.2} ({:?})",
                    tally.frames(),
                    tally.peak(),
                    tally.mean(),
                    completion
                );
                Ok(MediaResult::from_tally(tally, frame_results, completion))
            }
            Err(err) => {
                if let Err(finish_err) = sink.finish() {
                    log::warn!("video: sink cleanup after failure also failed: {:#}", finish_err);
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{build_detector, DetectorSettings, ModelFamily, RawOutput, ScriptedBackend};
    use crate::ingest::{MemorySink, MemorySource};

    fn people(count: usize) -> RawOutput {
        let rows: Vec<[f32; 7]> = (0..count)
            .map(|i| {
                let x = i as f32 * 0.1;
                [0.0, 15.0, 0.9, x, 0.1, x + 0.05, 0.5]
            })
            .collect();
        RawOutput::single_shot_table(&rows)
    }

    fn pipeline(counts: &[usize]) -> MediaPipeline {
        let backend = ScriptedBackend::new(counts.iter().map(|&c| people(c)));
        let detector = build_detector(
            ModelFamily::SingleShot,
            Box::new(backend),
            DetectorSettings::default(),
        );
        MediaPipeline::new(detector, Annotator::new())
    }

    fn frames(n: usize) -> Vec<Frame> {
        vec![Frame::filled(200, 120, [40, 40, 40]); n]
    }

    #[test]
    fn progress_reports_running_peak() {
        let mut pipeline = pipeline(&[1, 3, 2]);
        let mut source = MemorySource::new(frames(3));
        let mut sink = MemorySink::new();
        let mut seen = Vec::new();
        let result = pipeline
            .process_video(&mut source, &mut sink, &CancelToken::new(), |p| {
                seen.push((p.frame_index, p.frame_count, p.peak))
            })
            .unwrap();
        assert_eq!(seen, vec![(0, 1, 1), (1, 3, 3), (2, 2, 3)]);
        assert_eq!(result.aggregate_count(), 3);
        assert_eq!(result.completion(), Completion::Finished);
        assert!(sink.is_finished());
    }

    #[test]
    fn cancelled_before_start_processes_nothing() {
        let mut pipeline = pipeline(&[4]);
        let mut source = MemorySource::new(frames(1));
        let mut sink = MemorySink::new();
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = pipeline
            .process_video(&mut source, &mut sink, &cancel, |_| {})
            .unwrap();
        assert_eq!(
            result.completion(),
            Completion::Cancelled { frames_processed: 0 }
        );
        assert_eq!(result.aggregate_count(), 0);
        assert!(sink.frames().is_empty());
        assert!(sink.is_finished());
    }

    #[test]
    fn source_failure_is_reported_with_position() {
        let mut pipeline = pipeline(&[1, 1, 1]);
        let mut source = MemorySource::new(frames(3)).failing_at(2);
        let mut sink = MemorySink::new();
        let err = pipeline
            .process_video(&mut source, &mut sink, &CancelToken::new(), |_| {})
            .unwrap_err();
        assert!(matches!(err, PipelineError::Source { frame_index: 2, .. }));
        assert_eq!(sink.frames().len(), 2);
        assert!(sink.is_finished());
    }

    #[test]
    fn result_serializes_completion_tag() {
        let mut pipeline = pipeline(&[2]);
        let (_, result) = pipeline.process_image(Frame::filled(50, 50, [0, 0, 0])).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["aggregate_count"], 2);
        assert_eq!(json["completion"]["status"], "finished");
        assert_eq!(json["frame_results"][0]["boxes"].as_array().unwrap().len(), 2);
    }
}
