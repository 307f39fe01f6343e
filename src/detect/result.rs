use std::ops::Deref;

use serde::Serialize;

use crate::frame::BoundingBox;

/// One decoded candidate. Immutable once the decoder has produced it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    #[serde(rename = "box")]
    bbox: BoundingBox,
    class_id: u32,
    confidence: f32,
}

impl Detection {
    /// Confidence is clamped into `[0, 1]`.
    pub fn new(bbox: BoundingBox, class_id: u32, confidence: f32) -> Self {
        Self {
            bbox,
            class_id,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    pub fn class_id(&self) -> u32 {
        self.class_id
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }
}

/// A detection that passed the person filter.
///
/// Only `PersonFilter` can build one, so holding a `PersonDetection` proves
/// the class and threshold checks already ran.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PersonDetection(Detection);

impl PersonDetection {
    pub(crate) fn accepted(detection: Detection) -> Self {
        Self(detection)
    }

    pub fn detection(&self) -> &Detection {
        &self.0
    }
}

impl Deref for PersonDetection {
    type Target = Detection;

    fn deref(&self) -> &Detection {
        &self.0
    }
}

/// Final person boxes for one frame, in the order the detector settled on.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FrameResult {
    boxes: Vec<PersonDetection>,
}

impl FrameResult {
    pub(crate) fn new(boxes: Vec<PersonDetection>) -> Self {
        Self { boxes }
    }

    pub fn boxes(&self) -> &[PersonDetection] {
        &self.boxes
    }

    pub fn count(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }
}
