#![cfg(feature = "backend-tract")]

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use ndarray::{ArrayD, IxDyn};
use tract_onnx::prelude::*;

use crate::detect::backend::{InferenceBackend, ModelFamily};
use crate::detect::raw::RawOutput;
use crate::frame::InferenceView;

type Plan = TypedRunnableModel<TypedModel>;

/// Per-family input normalization: `(pixel - mean) * scale`, in channel order.
struct Preprocess {
    mean: f32,
    scale: f32,
    bgr: bool,
}

impl Preprocess {
    fn for_family(family: ModelFamily) -> Self {
        match family {
            ModelFamily::SingleShot => Self {
                mean: 127.5,
                scale: 0.007843,
                bgr: true,
            },
            ModelFamily::GridAnchor => Self {
                mean: 0.0,
                scale: 1.0 / 255.0,
                bgr: false,
            },
        }
    }
}

/// Tract-based backend for local ONNX detector models.
///
/// The frame is resized to the family's square input and normalized the way
/// the family's networks were trained. Outputs are handed back untouched; the
/// family decoder interprets them.
pub struct TractBackend {
    model_path: PathBuf,
    family: ModelFamily,
    input_size: u32,
    preprocess: Preprocess,
    plan: Option<Plan>,
}

impl TractBackend {
    pub fn new<P: AsRef<Path>>(model_path: P, family: ModelFamily) -> Self {
        Self {
            model_path: model_path.as_ref().to_path_buf(),
            family,
            input_size: family.input_size(),
            preprocess: Preprocess::for_family(family),
            plan: None,
        }
    }

    /// Override the square input edge baked into the model.
    pub fn with_input_size(mut self, input_size: u32) -> Self {
        self.input_size = input_size;
        self
    }

    pub fn family(&self) -> ModelFamily {
        self.family
    }

    fn build_input(&self, view: InferenceView<'_>) -> Tensor {
        let size = self.input_size;
        let resized = imageops::resize(&view.to_rgb_image(), size, size, FilterType::Triangle);
        let Preprocess { mean, scale, bgr } = self.preprocess;
        let side = size as usize;
        tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, channel, y, x)| {
            let channel = if bgr { 2 - channel } else { channel };
            let value = resized.get_pixel(x as u32, y as u32)[channel] as f32;
            (value - mean) * scale
        })
        .into_tensor()
    }
}

fn to_array(tensor: &Tensor) -> Result<ArrayD<f32>> {
    let view = tensor
        .to_array_view::<f32>()
        .context("model output tensor was not f32")?;
    let shape = view.shape().to_vec();
    ArrayD::from_shape_vec(IxDyn(&shape), view.iter().copied().collect())
        .context("model output tensor is not contiguous")
}

impl InferenceBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn load(&mut self) -> Result<()> {
        let side = self.input_size as usize;
        let plan = tract_onnx::onnx()
            .model_for_path(&self.model_path)
            .with_context(|| {
                format!("failed to load ONNX model from {}", self.model_path.display())
            })?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;
        self.plan = Some(plan);
        Ok(())
    }

    fn run_inference(&mut self, view: InferenceView<'_>) -> Result<RawOutput> {
        let input = self.build_input(view);
        let plan = self
            .plan
            .as_ref()
            .ok_or_else(|| anyhow!("ONNX model {} not loaded", self.model_path.display()))?;
        let outputs = plan.run(tvec!(input.into())).context("ONNX inference failed")?;
        let tensors = outputs
            .iter()
            .map(|value| to_array(value))
            .collect::<Result<Vec<_>>>()?;
        Ok(RawOutput::new(tensors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_fails_to_load() {
        let mut backend = TractBackend::new("/nonexistent/model.onnx", ModelFamily::GridAnchor);
        assert!(backend.load().is_err());
    }

    #[test]
    fn single_shot_input_is_bgr_and_centered() {
        let backend = TractBackend::new("unused.onnx", ModelFamily::SingleShot).with_input_size(4);
        let frame = crate::frame::Frame::filled(8, 8, [255, 0, 128]);
        let input = backend.build_input(frame.inference_view());
        let view = input.to_array_view::<f32>().unwrap();
        assert_eq!(view.shape(), &[1, 3, 4, 4]);
        assert!((view[[0, 0, 0, 0]] - (128.0 - 127.5) * 0.007843).abs() < 1e-5);
        assert!((view[[0, 2, 0, 0]] - (255.0 - 127.5) * 0.007843).abs() < 1e-5);
    }
}
