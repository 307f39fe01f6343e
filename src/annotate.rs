//! Frame annotation: person boxes and the running count label.
//!
//! The label is rendered as `Total no. of people : N` with a TrueType font
//! when one is configured. Without one, only the count `N` is drawn, as
//! seven-segment digits on a dark plate, and no external assets are needed.

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::detect::FrameResult;
use crate::frame::Frame;

pub const BOX_COLOUR: Rgb<u8> = Rgb([255, 0, 0]);
pub const LABEL_COLOUR: Rgb<u8> = Rgb([0, 255, 0]);
const PLATE_COLOUR: Rgb<u8> = Rgb([24, 24, 24]);

const BOX_THICKNESS: i32 = 2;
/// Label anchor: `LABEL_LEFT` from the left edge, baseline `LABEL_BASELINE`
/// above the bottom edge.
const LABEL_LEFT: i32 = 10;
const LABEL_BASELINE: i32 = 20;
const LABEL_SCALE: f32 = 24.0;

// Seven-segment geometry, in pixels.
const SEGMENT: i32 = 8;
const STROKE: i32 = 2;
const DIGIT_W: i32 = STROKE * 2 + SEGMENT;
const DIGIT_H: i32 = STROKE * 3 + SEGMENT * 2;
const DIGIT_GAP: i32 = 4;
const PLATE_PAD: i32 = 4;

/// Segment masks for 0-9, bit 0 = top (a) through bit 6 = middle (g).
const DIGIT_SEGMENTS: [u8; 10] = [0x3F, 0x06, 0x5B, 0x4F, 0x66, 0x6D, 0x7D, 0x07, 0x7F, 0x6F];

/// Label drawn on every annotated frame.
pub fn label_text(count: usize) -> String {
    format!("Total no. of people : {}", count)
}

#[derive(Clone, Default)]
pub struct Annotator {
    font: Option<FontArc>,
}

impl Annotator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_font(font: FontArc) -> Self {
        Self { font: Some(font) }
    }

    /// Load a TrueType/OpenType font for the label.
    pub fn from_font_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read font {}", path.display()))?;
        let font = FontArc::try_from_vec(bytes)
            .with_context(|| format!("{} is not a usable font", path.display()))?;
        Ok(Self::with_font(font))
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Text the label shows for `count`: the full caption with a font, the
    /// bare number without one.
    pub fn caption(&self, count: usize) -> String {
        match self.font {
            Some(_) => label_text(count),
            None => count.to_string(),
        }
    }

    /// Draw every person box and the count label. Pixels outside the boxes and
    /// `label_region` are left as they were.
    pub fn annotate(&self, frame: Frame, result: &FrameResult) -> Frame {
        let (width, height) = (frame.width(), frame.height());
        if width == 0 || height == 0 {
            return frame;
        }
        let mut image = frame.into_image();
        for person in result.boxes() {
            let bbox = person.bbox();
            draw_box(
                &mut image,
                bbox.x1(),
                bbox.y1(),
                bbox.width() as i32,
                bbox.height() as i32,
            );
        }
        self.draw_label(&mut image, result.count());
        Frame::from_image(image)
    }

    /// Rectangle covered by the label for `count` on a `width` x `height`
    /// frame, clipped to the frame. `None` when nothing of it is visible.
    pub fn label_region(&self, width: u32, height: u32, count: usize) -> Option<Rect> {
        if width == 0 || height == 0 {
            return None;
        }
        let frame = Rect::at(0, 0).of_size(width, height);
        self.unclipped_label_region(height, count)
            .and_then(|region| region.intersect(frame))
    }

    fn unclipped_label_region(&self, height: u32, count: usize) -> Option<Rect> {
        let baseline = height as i32 - LABEL_BASELINE;
        match &self.font {
            Some(font) => {
                let (w, h) = text_size(PxScale::from(LABEL_SCALE), font, &self.caption(count));
                if w == 0 || h == 0 {
                    return None;
                }
                // One pixel of slack for anti-aliased glyph edges.
                Some(Rect::at(LABEL_LEFT - 1, baseline - h as i32 - 1).of_size(w + 2, h + 2))
            }
            None => {
                let digits = self.caption(count).len() as i32;
                let inner_w = digits * DIGIT_W + (digits - 1) * DIGIT_GAP;
                Some(
                    Rect::at(LABEL_LEFT, baseline - DIGIT_H - PLATE_PAD)
                        .of_size((inner_w + PLATE_PAD * 2) as u32, (DIGIT_H + PLATE_PAD * 2) as u32),
                )
            }
        }
    }

    fn draw_label(&self, image: &mut RgbImage, count: usize) {
        let baseline = image.height() as i32 - LABEL_BASELINE;
        match &self.font {
            Some(font) => {
                let text = self.caption(count);
                let scale = PxScale::from(LABEL_SCALE);
                let (_, h) = text_size(scale, font, &text);
                draw_text_mut(
                    image,
                    LABEL_COLOUR,
                    LABEL_LEFT,
                    baseline - h as i32,
                    scale,
                    font,
                    &text,
                );
            }
            None => {
                if let Some(plate) = self.unclipped_label_region(image.height(), count) {
                    draw_filled_rect_mut(image, plate, PLATE_COLOUR);
                }
                let top = baseline - DIGIT_H;
                let mut left = LABEL_LEFT + PLATE_PAD;
                for digit in self.caption(count).bytes() {
                    draw_digit(image, left, top, digit - b'0');
                    left += DIGIT_W + DIGIT_GAP;
                }
            }
        }
    }
}

impl std::fmt::Debug for Annotator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Annotator")
            .field("font", &self.font.is_some())
            .finish()
    }
}

/// 2px hollow box whose outer edge includes both corner pixels.
fn draw_box(image: &mut RgbImage, x: i32, y: i32, w: i32, h: i32) {
    for inset in 0..BOX_THICKNESS {
        let (rw, rh) = (w + 1 - 2 * inset, h + 1 - 2 * inset);
        if rw <= 0 || rh <= 0 {
            break;
        }
        let rect = Rect::at(x + inset, y + inset).of_size(rw as u32, rh as u32);
        draw_hollow_rect_mut(image, rect, BOX_COLOUR);
    }
}

fn draw_digit(image: &mut RgbImage, x: i32, y: i32, digit: u8) {
    let Some(&mask) = DIGIT_SEGMENTS.get(digit as usize) else {
        return;
    };
    let (s, t) = (SEGMENT, STROKE);
    let horizontal = (s as u32, t as u32);
    let vertical = (t as u32, s as u32);
    let segments = [
        (x + t, y, horizontal),
        (x + t + s, y + t, vertical),
        (x + t + s, y + 2 * t + s, vertical),
        (x + t, y + 2 * t + 2 * s, horizontal),
        (x, y + 2 * t + s, vertical),
        (x, y + t, vertical),
        (x + t, y + t + s, horizontal),
    ];
    for (bit, (sx, sy, (w, h))) in segments.into_iter().enumerate() {
        if mask & (1 << bit) != 0 {
            draw_filled_rect_mut(image, Rect::at(sx, sy).of_size(w, h), LABEL_COLOUR);
        }
    }
}
