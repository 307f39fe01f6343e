use serde::Serialize;

/// Running per-frame people statistics.
///
/// Folded once per frame with `observe`; `peak` is the aggregate count
/// reported for a video (the most people seen together in one frame).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OccupancyTally {
    frames: u64,
    peak: usize,
    total: u64,
}

impl OccupancyTally {
    #[must_use]
    pub fn observe(self, count: usize) -> Self {
        Self {
            frames: self.frames + 1,
            peak: self.peak.max(count),
            total: self.total + count as u64,
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn peak(&self) -> usize {
        self.peak
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Average people per frame. Diagnostic only, never the aggregate.
    pub fn mean(&self) -> f64 {
        if self.frames == 0 {
            0.0
        } else {
            self.total as f64 / self.frames as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_is_the_maximum_frame_count() {
        let tally = [2, 5, 3, 0]
            .into_iter()
            .fold(OccupancyTally::default(), OccupancyTally::observe);
        assert_eq!(tally.peak(), 5);
        assert_eq!(tally.frames(), 4);
        assert_eq!(tally.total(), 10);
        assert_eq!(tally.mean(), 2.5);
    }

    #[test]
    fn empty_tally_is_zero() {
        let tally = OccupancyTally::default();
        assert_eq!(tally.peak(), 0);
        assert_eq!(tally.mean(), 0.0);
    }
}
