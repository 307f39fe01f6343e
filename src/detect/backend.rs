use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::Deserialize;

use crate::detect::raw::RawOutput;
use crate::frame::InferenceView;

/// Overlap above which two person boxes are treated as the same person.
pub const DEFAULT_OVERLAP_THRESHOLD: f32 = 0.4;

/// Detector output convention. Picks the decoder, the person class id and
/// whether duplicate suppression runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelFamily {
    /// SSD-style: one row per detection, already deduplicated by the model.
    SingleShot,
    /// YOLO-style: many candidates per grid cell, needs NMS.
    GridAnchor,
}

impl ModelFamily {
    pub fn name(self) -> &'static str {
        match self {
            ModelFamily::SingleShot => "single-shot",
            ModelFamily::GridAnchor => "grid-anchor",
        }
    }

    /// Person label in the family's label set (VOC for single-shot, COCO for grid-anchor).
    pub fn person_class(self) -> u32 {
        match self {
            ModelFamily::SingleShot => 15,
            ModelFamily::GridAnchor => 0,
        }
    }

    /// The two families calibrate confidence differently.
    pub fn default_confidence_threshold(self) -> f32 {
        match self {
            ModelFamily::SingleShot => 0.4,
            ModelFamily::GridAnchor => 0.5,
        }
    }

    /// Square network input edge in pixels.
    pub fn input_size(self) -> u32 {
        match self {
            ModelFamily::SingleShot => 300,
            ModelFamily::GridAnchor => 416,
        }
    }

    pub fn needs_suppression(self) -> bool {
        matches!(self, ModelFamily::GridAnchor)
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelFamily {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "single-shot" | "ssd" | "mobilenet-ssd" => Ok(ModelFamily::SingleShot),
            "grid-anchor" | "yolo" | "yolov4" => Ok(ModelFamily::GridAnchor),
            other => Err(anyhow!(
                "unknown model family '{}' (expected single-shot or grid-anchor)",
                other
            )),
        }
    }
}

/// Forward-pass capability consumed by the frame detectors.
///
/// Implementations must treat the view as read-only and must not keep pixels
/// past the `run_inference` call. A backend is loaded once, before first use.
pub trait InferenceBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Load weights / build the runnable model.
    fn load(&mut self) -> Result<()> {
        Ok(())
    }

    /// Run the network on one frame and return its raw tensors.
    fn run_inference(&mut self, view: InferenceView<'_>) -> Result<RawOutput>;
}
