//! Raw output decoders, one per model family.
//!
//! Both are pure functions of the raw tensors and the frame size. They turn
//! normalized model coordinates into clamped pixel boxes.

use ndarray::ArrayD;

use crate::detect::backend::ModelFamily;
use crate::detect::raw::RawOutput;
use crate::detect::result::Detection;
use crate::error::DecodeError;
use crate::frame::BoundingBox;

const SINGLE_SHOT_COLUMNS: usize = 7;
/// cx, cy, w, h, objectness, then at least one class score.
const GRID_MIN_COLUMNS: usize = 6;
const GRID_SCORES_OFFSET: usize = 5;

/// Decode with the layout of `family`.
///
/// `confidence_threshold` only gates grid-anchor cells; single-shot rows are
/// all decoded and left to the person filter.
pub fn decode(
    family: ModelFamily,
    raw: &RawOutput,
    width: u32,
    height: u32,
    confidence_threshold: f32,
) -> Result<Vec<Detection>, DecodeError> {
    match family {
        ModelFamily::SingleShot => decode_single_shot(raw, width, height),
        ModelFamily::GridAnchor => decode_grid_anchor(raw, width, height, confidence_threshold),
    }
}

/// Decode a single-shot table of `(image_index, class_id, confidence, x1, y1, x2, y2)` rows.
pub fn decode_single_shot(
    raw: &RawOutput,
    width: u32,
    height: u32,
) -> Result<Vec<Detection>, DecodeError> {
    let tensor = match raw.tensors() {
        [tensor] => tensor,
        other => {
            return Err(DecodeError::TensorCount {
                expected: "exactly 1",
                actual: other.len(),
            })
        }
    };
    let values = rows_of(tensor, 2..=4, |cols| cols == SINGLE_SHOT_COLUMNS)?;
    let (w, h) = (width as f32, height as f32);

    let detections = values
        .chunks_exact(SINGLE_SHOT_COLUMNS)
        .filter(|row| row.iter().all(|v| v.is_finite()))
        // Padding rows carry a negative image index / class.
        .filter(|row| row[0] >= 0.0 && row[1] >= 0.0)
        .filter_map(|row| {
            let bbox = BoundingBox::clamped(row[3] * w, row[4] * h, row[5] * w, row[6] * h, width, height)?;
            Some(Detection::new(bbox, row[1] as u32, row[2]))
        })
        .collect();
    Ok(detections)
}

/// Decode grid-anchor outputs of `(cx, cy, w, h, objectness, scores...)` rows.
///
/// Each row keeps its best-scoring class, and only when that score exceeds
/// `confidence_threshold`. Overlapping candidates are left for NMS.
pub fn decode_grid_anchor(
    raw: &RawOutput,
    width: u32,
    height: u32,
    confidence_threshold: f32,
) -> Result<Vec<Detection>, DecodeError> {
    if raw.tensors().is_empty() {
        return Err(DecodeError::TensorCount {
            expected: "at least 1",
            actual: 0,
        });
    }
    let (w, h) = (width as f32, height as f32);
    let mut detections = Vec::new();

    for tensor in raw.tensors() {
        let cols = tensor.shape().last().copied().unwrap_or(0);
        let values = rows_of(tensor, 2..=3, |cols| cols >= GRID_MIN_COLUMNS)?;

        for row in values.chunks_exact(cols) {
            let Some((class_id, score)) = best_class(&row[GRID_SCORES_OFFSET..]) else {
                continue;
            };
            if !(score > confidence_threshold) {
                continue;
            }
            if row[..4].iter().any(|v| !v.is_finite()) {
                continue;
            }
            let (box_w, box_h) = (row[2] * w, row[3] * h);
            let x1 = row[0] * w - box_w / 2.0;
            let y1 = row[1] * h - box_h / 2.0;
            if let Some(bbox) = BoundingBox::clamped(x1, y1, x1 + box_w, y1 + box_h, width, height) {
                detections.push(Detection::new(bbox, class_id as u32, score));
            }
        }
    }
    Ok(detections)
}

/// Flatten a `[1, ..., rows, cols]` tensor into row-major values.
fn rows_of(
    tensor: &ArrayD<f32>,
    ranks: std::ops::RangeInclusive<usize>,
    cols_ok: impl Fn(usize) -> bool,
) -> Result<Vec<f32>, DecodeError> {
    let shape = tensor.shape();
    if !ranks.contains(&shape.len()) {
        return Err(DecodeError::Shape {
            shape: shape.to_vec(),
            reason: "unexpected rank",
        });
    }
    let leading = &shape[..shape.len() - 2];
    if leading.iter().any(|&dim| dim != 1) {
        return Err(DecodeError::Shape {
            shape: shape.to_vec(),
            reason: "leading dimensions must be 1",
        });
    }
    if !cols_ok(shape[shape.len() - 1]) {
        return Err(DecodeError::Shape {
            shape: shape.to_vec(),
            reason: "unexpected column count",
        });
    }
    Ok(tensor.iter().copied().collect())
}

/// Index and value of the first maximum score.
fn best_class(scores: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, &score) in scores.iter().enumerate() {
        match best {
            Some((_, top)) if score <= top => {}
            _ if score.is_nan() => {}
            _ => best = Some((idx, score)),
        }
    }
    best
}
