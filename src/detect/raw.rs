use ndarray::{Array2, ArrayD, IxDyn};

/// Opaque inference output: the tensors a backend's forward pass produced.
///
/// Shapes are backend-specific. The decoder for the backend's family is the
/// only code that interprets them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawOutput {
    tensors: Vec<ArrayD<f32>>,
}

impl RawOutput {
    pub fn new(tensors: Vec<ArrayD<f32>>) -> Self {
        Self { tensors }
    }

    pub fn single(tensor: ArrayD<f32>) -> Self {
        Self {
            tensors: vec![tensor],
        }
    }

    /// Single-shot table `[1, 1, N, 7]` from rows of
    /// `(image_index, class_id, confidence, x1, y1, x2, y2)`.
    pub fn single_shot_table(rows: &[[f32; 7]]) -> Self {
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        let table = ArrayD::from_shape_vec(IxDyn(&[1, 1, rows.len(), 7]), flat)
            .unwrap_or_else(|_| ArrayD::zeros(IxDyn(&[1, 1, 0, 7])));
        Self::single(table)
    }

    /// One grid-anchor output `[rows, 5 + classes]` from
    /// `(cx, cy, w, h, objectness, scores...)` rows of equal length.
    pub fn grid(rows: &[Vec<f32>]) -> Self {
        Self::single(grid_tensor(rows))
    }

    pub fn tensors(&self) -> &[ArrayD<f32>] {
        &self.tensors
    }

    pub fn into_tensors(self) -> Vec<ArrayD<f32>> {
        self.tensors
    }
}

pub(crate) fn grid_tensor(rows: &[Vec<f32>]) -> ArrayD<f32> {
    let cols = rows.first().map_or(0, Vec::len);
    let flat: Vec<f32> = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((rows.len(), cols), flat)
        .unwrap_or_else(|_| Array2::zeros((0, cols)))
        .into_dyn()
}
