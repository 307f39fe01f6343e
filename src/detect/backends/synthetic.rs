use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::detect::backend::{InferenceBackend, ModelFamily};
use crate::detect::raw::RawOutput;
use crate::frame::InferenceView;

/// Grid-anchor class columns emitted: person, bicycle, car.
const GRID_CLASSES: usize = 3;
const VOC_CAR: f32 = 7.0;

/// Deterministic fake detector that "sees" a scripted crowd.
///
/// Each frame contains a known number of people standing side by side. In
/// grid-anchor mode every person is reported three times with small jitter,
/// the way a real YOLO head reports neighbouring cells, so suppression has
/// work to do. Both modes add a non-person object and a weak person candidate
/// that the filter must drop.
pub struct SyntheticCrowdBackend {
    family: ModelFamily,
    rng: StdRng,
    counts: Vec<usize>,
    max_people: usize,
    frame_index: usize,
}

impl SyntheticCrowdBackend {
    pub fn new(family: ModelFamily, seed: u64) -> Self {
        Self {
            family,
            rng: StdRng::seed_from_u64(seed),
            counts: Vec::new(),
            max_people: 6,
            frame_index: 0,
        }
    }

    /// People per frame, cycled. Without a script counts are drawn at random.
    pub fn with_counts(mut self, counts: Vec<usize>) -> Self {
        self.counts = counts;
        self
    }

    pub fn with_max_people(mut self, max_people: usize) -> Self {
        self.max_people = max_people.max(1);
        self
    }

    fn next_count(&mut self) -> usize {
        if self.counts.is_empty() {
            self.rng.gen_range(0..=self.max_people)
        } else {
            self.counts[self.frame_index % self.counts.len()]
        }
    }

    /// Normalized `(cx, cy, w, h)` for person `slot` of `count`.
    fn place(&mut self, slot: usize, count: usize) -> (f32, f32, f32, f32) {
        let lane = 1.0 / count as f32;
        let w = (lane * 0.6).min(0.2);
        let h = self.rng.gen_range(0.4..0.7);
        let cx = lane * (slot as f32 + 0.5);
        let cy = self.rng.gen_range(0.4..0.6);
        (cx, cy, w, h)
    }

    fn grid_output(&mut self, count: usize) -> RawOutput {
        let mut rows = Vec::with_capacity(count * 3 + 2);
        for slot in 0..count {
            let (cx, cy, w, h) = self.place(slot, count);
            let score = self.rng.gen_range(0.75..0.98);
            rows.push(grid_row(cx, cy, w, h, 0, score));
            for _ in 0..2 {
                let dx = self.rng.gen_range(-0.05..0.05) * w;
                let dy = self.rng.gen_range(-0.05..0.05) * h;
                let echo = score - self.rng.gen_range(0.05..0.2);
                rows.push(grid_row(cx + dx, cy + dy, w, h, 0, echo));
            }
        }
        rows.push(grid_row(0.5, 0.85, 0.3, 0.2, 2, 0.9));
        rows.push(grid_row(0.5, 0.5, 0.1, 0.3, 0, 0.3));
        RawOutput::grid(&rows)
    }

    fn table_output(&mut self, count: usize) -> RawOutput {
        let mut rows = Vec::with_capacity(count + 2);
        for slot in 0..count {
            let (cx, cy, w, h) = self.place(slot, count);
            let score = self.rng.gen_range(0.6..0.99);
            rows.push(table_row(15.0, score, cx, cy, w, h));
        }
        rows.push(table_row(VOC_CAR, 0.9, 0.5, 0.85, 0.3, 0.2));
        rows.push(table_row(15.0, 0.2, 0.5, 0.5, 0.1, 0.3));
        RawOutput::single_shot_table(&rows)
    }
}

fn grid_row(cx: f32, cy: f32, w: f32, h: f32, class: usize, score: f32) -> Vec<f32> {
    let mut row = vec![cx.clamp(0.0, 1.0), cy.clamp(0.0, 1.0), w, h, 1.0];
    let mut scores = [0.0_f32; GRID_CLASSES];
    scores[class] = score;
    row.extend_from_slice(&scores);
    row
}

fn table_row(class: f32, score: f32, cx: f32, cy: f32, w: f32, h: f32) -> [f32; 7] {
    [
        0.0,
        class,
        score,
        (cx - w / 2.0).max(0.0),
        (cy - h / 2.0).max(0.0),
        (cx + w / 2.0).min(1.0),
        (cy + h / 2.0).min(1.0),
    ]
}

impl InferenceBackend for SyntheticCrowdBackend {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn run_inference(&mut self, _view: InferenceView<'_>) -> Result<RawOutput> {
        let count = self.next_count();
        self.frame_index += 1;
        Ok(match self.family {
            ModelFamily::GridAnchor => self.grid_output(count),
            ModelFamily::SingleShot => self.table_output(count),
        })
    }
}
