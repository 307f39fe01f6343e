use crate::detect::backend::{InferenceBackend, ModelFamily, DEFAULT_OVERLAP_THRESHOLD};
use crate::detect::decode::{decode_grid_anchor, decode_single_shot};
use crate::detect::filter::PersonFilter;
use crate::detect::nms;
use crate::detect::raw::RawOutput;
use crate::detect::result::{FrameResult, PersonDetection};
use crate::error::PipelineError;
use crate::frame::{BoundingBox, Frame};

/// Per-frame person detector.
///
/// One implementation per model family, selected at configuration time.
pub trait PeopleDetector: Send {
    fn name(&self) -> &'static str;

    fn family(&self) -> ModelFamily;

    /// Load the backend. Calling it again is a no-op.
    fn load(&mut self) -> Result<(), PipelineError>;

    /// Decode, filter and (family permitting) deduplicate one frame.
    ///
    /// The frame is only read. Backend faults are returned, never retried.
    fn detect_people(&mut self, frame: &Frame) -> Result<FrameResult, PipelineError>;
}

/// Threshold overrides applied on top of the family defaults.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectorSettings {
    pub confidence_threshold: Option<f32>,
    pub overlap_threshold: f32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: None,
            overlap_threshold: DEFAULT_OVERLAP_THRESHOLD,
        }
    }
}

/// Build the detector for `family` around `backend`.
pub fn build_detector(
    family: ModelFamily,
    backend: Box<dyn InferenceBackend>,
    settings: DetectorSettings,
) -> Box<dyn PeopleDetector> {
    let mut filter = PersonFilter::for_family(family);
    if let Some(threshold) = settings.confidence_threshold {
        filter = filter.with_threshold(threshold);
    }
    match family {
        ModelFamily::SingleShot => Box::new(SingleShotDetector::new(backend, filter)),
        ModelFamily::GridAnchor => Box::new(GridAnchorDetector::new(
            backend,
            filter,
            settings.overlap_threshold,
        )),
    }
}

// ----------------------------------------------------------------------------
// Backend slot shared by both detectors
// ----------------------------------------------------------------------------

struct BackendSlot {
    backend: Box<dyn InferenceBackend>,
    loaded: bool,
}

impl BackendSlot {
    fn new(backend: Box<dyn InferenceBackend>) -> Self {
        Self {
            backend,
            loaded: false,
        }
    }

    fn name(&self) -> &'static str {
        self.backend.name()
    }

    fn load(&mut self) -> Result<(), PipelineError> {
        if self.loaded {
            return Ok(());
        }
        self.backend
            .load()
            .map_err(|err| PipelineError::Inference {
                backend: self.backend.name(),
                source: err.into(),
            })?;
        self.loaded = true;
        log::info!("detector backend '{}' loaded", self.backend.name());
        Ok(())
    }

    fn infer(&mut self, frame: &Frame) -> Result<RawOutput, PipelineError> {
        if !self.loaded {
            return Err(PipelineError::NotLoaded {
                backend: self.backend.name(),
            });
        }
        self.backend
            .run_inference(frame.inference_view())
            .map_err(|err| PipelineError::Inference {
                backend: self.backend.name(),
                source: err.into(),
            })
    }
}

// ----------------------------------------------------------------------------
// Single-shot: decode -> filter
// ----------------------------------------------------------------------------

/// Detector for models that emit one already-deduplicated row per object.
pub struct SingleShotDetector {
    slot: BackendSlot,
    filter: PersonFilter,
}

impl SingleShotDetector {
    pub fn new(backend: Box<dyn InferenceBackend>, filter: PersonFilter) -> Self {
        Self {
            slot: BackendSlot::new(backend),
            filter,
        }
    }
}

impl PeopleDetector for SingleShotDetector {
    fn name(&self) -> &'static str {
        self.slot.name()
    }

    fn family(&self) -> ModelFamily {
        ModelFamily::SingleShot
    }

    fn load(&mut self) -> Result<(), PipelineError> {
        self.slot.load()
    }

    fn detect_people(&mut self, frame: &Frame) -> Result<FrameResult, PipelineError> {
        let raw = self.slot.infer(frame)?;
        let decoded = decode_single_shot(&raw, frame.width(), frame.height())?;
        let candidates = decoded.len();
        let people = self.filter.filter(decoded);
        log::debug!(
            "single-shot: {} rows decoded, {} people",
            candidates,
            people.len()
        );
        Ok(FrameResult::new(people))
    }
}

// ----------------------------------------------------------------------------
// Grid-anchor: decode -> filter -> suppress
// ----------------------------------------------------------------------------

/// Detector for models that emit many overlapping candidates per object.
pub struct GridAnchorDetector {
    slot: BackendSlot,
    filter: PersonFilter,
    overlap_threshold: f32,
}

impl GridAnchorDetector {
    pub fn new(
        backend: Box<dyn InferenceBackend>,
        filter: PersonFilter,
        overlap_threshold: f32,
    ) -> Self {
        Self {
            slot: BackendSlot::new(backend),
            filter,
            overlap_threshold,
        }
    }
}

impl PeopleDetector for GridAnchorDetector {
    fn name(&self) -> &'static str {
        self.slot.name()
    }

    fn family(&self) -> ModelFamily {
        ModelFamily::GridAnchor
    }

    fn load(&mut self) -> Result<(), PipelineError> {
        self.slot.load()
    }

    fn detect_people(&mut self, frame: &Frame) -> Result<FrameResult, PipelineError> {
        let raw = self.slot.infer(frame)?;
        let threshold = self.filter.threshold();
        let decoded = decode_grid_anchor(&raw, frame.width(), frame.height(), threshold)?;
        let candidates = decoded.len();
        let people = self.filter.filter(decoded);

        let boxes: Vec<BoundingBox> = people.iter().map(|p| p.bbox()).collect();
        let confidences: Vec<f32> = people.iter().map(|p| p.confidence()).collect();
        let keep = nms::suppress(&boxes, &confidences, threshold, self.overlap_threshold);

        let mut slots: Vec<Option<PersonDetection>> = people.into_iter().map(Some).collect();
        let kept: Vec<PersonDetection> = keep
            .into_iter()
            .filter_map(|idx| slots.get_mut(idx).and_then(Option::take))
            .collect();
        log::debug!(
            "grid-anchor: {} candidates, {} after suppression",
            candidates,
            kept.len()
        );
        Ok(FrameResult::new(kept))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::ScriptedBackend;

    fn frame() -> Frame {
        Frame::filled(200, 100, [90, 90, 90])
    }

    #[test]
    fn detect_before_load_is_rejected() {
        let backend = ScriptedBackend::new([RawOutput::single_shot_table(&[])]);
        let mut detector = build_detector(
            ModelFamily::SingleShot,
            Box::new(backend),
            DetectorSettings::default(),
        );
        let err = detector.detect_people(&frame()).unwrap_err();
        assert!(matches!(err, PipelineError::NotLoaded { backend: "scripted" }));
    }

    #[test]
    fn load_reaches_backend_once() {
        let backend = ScriptedBackend::new([]);
        let loads = backend.load_counter();
        let mut detector = build_detector(
            ModelFamily::GridAnchor,
            Box::new(backend),
            DetectorSettings::default(),
        );
        detector.load().unwrap();
        detector.load().unwrap();
        assert_eq!(loads.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn single_shot_keeps_overlapping_people() {
        let backend = ScriptedBackend::new([RawOutput::single_shot_table(&[
            [0.0, 15.0, 0.9, 0.1, 0.1, 0.4, 0.9],
            [0.0, 15.0, 0.8, 0.12, 0.1, 0.42, 0.9],
            [0.0, 15.0, 0.3, 0.6, 0.1, 0.8, 0.9],
            [0.0, 12.0, 0.99, 0.6, 0.1, 0.8, 0.9],
        ])]);
        let mut detector = build_detector(
            ModelFamily::SingleShot,
            Box::new(backend),
            DetectorSettings::default(),
        );
        detector.load().unwrap();
        let result = detector.detect_people(&frame()).unwrap();
        assert_eq!(result.count(), 2);
    }

    #[test]
    fn grid_anchor_collapses_duplicate_candidates() {
        let backend = ScriptedBackend::new([RawOutput::grid(&[
            vec![0.25, 0.5, 0.2, 0.8, 1.0, 0.70, 0.1],
            vec![0.26, 0.5, 0.2, 0.8, 1.0, 0.92, 0.1],
            vec![0.24, 0.51, 0.2, 0.8, 1.0, 0.81, 0.1],
            vec![0.75, 0.5, 0.2, 0.8, 1.0, 0.66, 0.1],
            vec![0.75, 0.5, 0.2, 0.8, 1.0, 0.1, 0.95],
        ])]);
        let mut detector = build_detector(
            ModelFamily::GridAnchor,
            Box::new(backend),
            DetectorSettings::default(),
        );
        detector.load().unwrap();
        let result = detector.detect_people(&frame()).unwrap();
        assert_eq!(result.count(), 2);
        let confidences: Vec<f32> = result.boxes().iter().map(|p| p.confidence()).collect();
        assert_eq!(confidences, vec![0.92, 0.66]);
    }

    #[test]
    fn confidence_override_applies() {
        let rows = [[0.0, 15.0, 0.45, 0.1, 0.1, 0.4, 0.9]];
        let backend = ScriptedBackend::new([RawOutput::single_shot_table(&rows)]);
        let mut detector = build_detector(
            ModelFamily::SingleShot,
            Box::new(backend),
            DetectorSettings {
                confidence_threshold: Some(0.5),
                ..DetectorSettings::default()
            },
        );
        detector.load().unwrap();
        assert_eq!(detector.detect_people(&frame()).unwrap().count(), 0);
    }

    #[test]
    fn malformed_output_is_a_decode_fault() {
        let backend = ScriptedBackend::new([RawOutput::grid(&[vec![0.5; 4]])]);
        let mut detector = build_detector(
            ModelFamily::GridAnchor,
            Box::new(backend),
            DetectorSettings::default(),
        );
        detector.load().unwrap();
        assert!(matches!(
            detector.detect_people(&frame()),
            Err(PipelineError::Decode(_))
        ));
    }

    #[test]
    fn backend_failure_is_an_inference_fault() {
        let backend = ScriptedBackend::new([]);
        let mut detector = build_detector(
            ModelFamily::SingleShot,
            Box::new(backend),
            DetectorSettings::default(),
        );
        detector.load().unwrap();
        assert!(matches!(
            detector.detect_people(&frame()),
            Err(PipelineError::Inference { backend: "scripted", .. })
        ));
    }
}
