//! Frame and box primitives.
//!
//! - `Frame`: owned RGB8 pixel grid handed to the pipeline by a frame source.
//! - `InferenceView`: read-only view that detector backends receive. It can be
//!   read and copied from, never written to.
//! - `BoundingBox`: integer pixel box that always satisfies `x1 < x2`, `y1 < y2`
//!   and lies inside the frame it was decoded for.

use image::RgbImage;
use serde::Serialize;

use crate::error::PipelineError;

// ----------------------------------------------------------------------------
// Frame: owned pixel container
// ----------------------------------------------------------------------------

/// Owned RGB8 frame. Row-major, three bytes per pixel, no row padding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl Frame {
    /// Wrap a packed RGB buffer. Fails when the length does not match the dimensions.
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self, PipelineError> {
        let expected = rgb_len(width, height);
        if data.len() != expected {
            return Err(PipelineError::InvalidFrame {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Solid-colour frame, mostly useful for synthetic sources and tests.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data = rgb.repeat(rgb_len(width, height) / 3);
        Self {
            data,
            width,
            height,
        }
    }

    pub fn from_image(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: image.into_raw(),
            width,
            height,
        }
    }

    pub fn into_image(self) -> RgbImage {
        let (width, height) = (self.width, self.height);
        // Length is checked at construction, so from_raw cannot reject it.
        RgbImage::from_raw(width, height, self.data).unwrap_or_else(|| RgbImage::new(width, height))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// RGB value at `(x, y)`, or `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
    }

    /// Backends get a restricted view for inference.
    pub fn inference_view(&self) -> InferenceView<'_> {
        InferenceView { frame: self }
    }
}

fn rgb_len(width: u32, height: u32) -> usize {
    (width as usize) * (height as usize) * 3
}

// ----------------------------------------------------------------------------
// InferenceView: read-only interface for backends
// ----------------------------------------------------------------------------

/// Read-only view of a frame for the duration of one inference call.
///
/// The borrow ties the view to the caller's frame, so a backend cannot keep
/// it past `run_inference`.
#[derive(Clone, Copy)]
pub struct InferenceView<'a> {
    frame: &'a Frame,
}

impl<'a> InferenceView<'a> {
    pub fn width(&self) -> u32 {
        self.frame.width
    }

    pub fn height(&self) -> u32 {
        self.frame.height
    }

    pub fn pixels(&self) -> &'a [u8] {
        &self.frame.data
    }

    /// Copy the pixels into an `RgbImage` for resizing and tensor building.
    pub fn to_rgb_image(&self) -> RgbImage {
        self.frame.clone().into_image()
    }
}

// ----------------------------------------------------------------------------
// BoundingBox
// ----------------------------------------------------------------------------

/// Person box in integer pixel coordinates of the source frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct BoundingBox {
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
}

impl BoundingBox {
    /// Build a box from corners, rejecting empty or inverted boxes.
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Option<Self> {
        if x1 < 0 || y1 < 0 || x1 >= x2 || y1 >= y2 {
            return None;
        }
        Some(Self { x1, y1, x2, y2 })
    }

    /// Truncate float pixel corners toward zero and clamp them into a
    /// `width` x `height` frame. Returns `None` when nothing is left.
    pub fn clamped(x1: f32, y1: f32, x2: f32, y2: f32, width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        let max_x = (width - 1) as i32;
        let max_y = (height - 1) as i32;
        let x1 = (x1 as i32).clamp(0, max_x);
        let y1 = (y1 as i32).clamp(0, max_y);
        let x2 = (x2 as i32).clamp(0, max_x);
        let y2 = (y2 as i32).clamp(0, max_y);
        Self::new(x1, y1, x2, y2)
    }

    pub fn x1(&self) -> i32 {
        self.x1
    }

    pub fn y1(&self) -> i32 {
        self.y1
    }

    pub fn x2(&self) -> i32 {
        self.x2
    }

    pub fn y2(&self) -> i32 {
        self.y2
    }

    pub fn width(&self) -> u32 {
        (self.x2 - self.x1) as u32
    }

    pub fn height(&self) -> u32 {
        (self.y2 - self.y1) as u32
    }

    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    pub fn intersection_area(&self, other: &BoundingBox) -> i64 {
        let l = self.x1.max(other.x1);
        let r = self.x2.min(other.x2);
        let t = self.y1.max(other.y1);
        let b = self.y2.min(other.y2);
        ((r - l).max(0) as i64) * ((b - t).max(0) as i64)
    }
}
