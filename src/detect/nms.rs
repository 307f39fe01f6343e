//! Greedy non-max suppression.

use crate::frame::BoundingBox;

/// Intersection over union. Zero when the union is empty.
pub fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let inter = a.intersection_area(b);
    let union = a.area() + b.area() - inter;
    if union <= 0 {
        return 0.0;
    }
    inter as f32 / union as f32
}

/// Indices of the boxes to keep, best first.
///
/// Candidates at or below `score_threshold` are dropped up front. The rest
/// are visited in descending confidence (equal confidences keep input order)
/// and a candidate survives only if its IoU with every box kept so far is at
/// most `overlap_threshold`. Pairs past the shorter slice are ignored.
pub fn suppress(
    boxes: &[BoundingBox],
    confidences: &[f32],
    score_threshold: f32,
    overlap_threshold: f32,
) -> Vec<usize> {
    let len = boxes.len().min(confidences.len());
    let mut order: Vec<usize> = (0..len)
        .filter(|&idx| confidences[idx] > score_threshold)
        .collect();
    // sort_by is stable, so ties stay in first-occurrence order.
    order.sort_by(|&a, &b| confidences[b].total_cmp(&confidences[a]));

    let mut keep: Vec<usize> = Vec::with_capacity(order.len());
    'candidates: for idx in order {
        for &kept in &keep {
            if iou(&boxes[kept], &boxes[idx]) > overlap_threshold {
                continue 'candidates;
            }
        }
        keep.push(idx);
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x1: i32, y1: i32, x2: i32, y2: i32) -> BoundingBox {
        BoundingBox::new(x1, y1, x2, y2).unwrap()
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = bbox(0, 0, 10, 10);
        assert_eq!(iou(&a, &a), 1.0);
        assert_eq!(iou(&a, &bbox(20, 20, 30, 30)), 0.0);
        // 50 overlap / 150 union
        let third = iou(&a, &bbox(5, 0, 15, 10));
        assert!((third - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn overlapping_pair_keeps_higher_confidence() {
        // IoU = 80 / 120 = 0.67
        let boxes = [bbox(0, 0, 10, 10), bbox(2, 0, 12, 10)];
        assert_eq!(suppress(&boxes, &[0.6, 0.9], 0.5, 0.4), vec![1]);
        assert_eq!(suppress(&boxes, &[0.9, 0.6], 0.5, 0.4), vec![0]);
    }

    #[test]
    fn pair_at_or_below_overlap_threshold_both_survive() {
        // IoU = 1/3 and then exactly 0.4 (40 / 100)
        let boxes = [bbox(0, 0, 10, 10), bbox(5, 0, 15, 10)];
        assert_eq!(suppress(&boxes, &[0.9, 0.8], 0.5, 0.4), vec![0, 1]);

        let boxes = [bbox(0, 0, 10, 7), bbox(0, 3, 10, 10)];
        assert!((iou(&boxes[0], &boxes[1]) - 0.4).abs() < 1e-6);
        assert_eq!(suppress(&boxes, &[0.7, 0.8], 0.5, 0.4), vec![1, 0]);
    }

    #[test]
    fn score_threshold_drops_weak_candidates() {
        let boxes = [bbox(0, 0, 10, 10), bbox(50, 50, 60, 60)];
        assert_eq!(suppress(&boxes, &[0.5, 0.51], 0.5, 0.4), vec![1]);
    }

    #[test]
    fn equal_confidence_resolves_to_first_occurrence() {
        let boxes = [bbox(0, 0, 10, 10), bbox(1, 0, 11, 10), bbox(2, 0, 12, 10)];
        assert_eq!(suppress(&boxes, &[0.8, 0.8, 0.8], 0.5, 0.4), vec![0]);
        assert_eq!(suppress(&boxes, &[0.7, 0.8, 0.8], 0.5, 0.4), vec![1]);
    }

    #[test]
    fn chain_of_overlaps_is_greedy() {
        // a overlaps b, b overlaps c, a and c are disjoint: a and c survive
        let boxes = [bbox(0, 0, 10, 10), bbox(4, 0, 14, 10), bbox(10, 0, 20, 10)];
        assert_eq!(suppress(&boxes, &[0.9, 0.8, 0.7], 0.5, 0.4), vec![0, 2]);
    }

    #[test]
    fn suppression_is_idempotent() {
        let boxes: Vec<BoundingBox> = (0..40)
            .map(|i| {
                let x = (i * 7 % 90) as i32;
                let y = (i * 13 % 70) as i32;
                bbox(x, y, x + 20 + (i % 5) as i32, y + 30)
            })
            .collect();
        let confidences: Vec<f32> = (0..40).map(|i| 0.5 + ((i * 37) % 50) as f32 / 100.0).collect();

        let first = suppress(&boxes, &confidences, 0.5, 0.4);
        let kept_boxes: Vec<BoundingBox> = first.iter().map(|&i| boxes[i]).collect();
        let kept_conf: Vec<f32> = first.iter().map(|&i| confidences[i]).collect();
        let second = suppress(&kept_boxes, &kept_conf, 0.5, 0.4);

        let remapped: Vec<usize> = second.iter().map(|&i| first[i]).collect();
        assert_eq!(remapped, first);
    }

    #[test]
    fn identical_inputs_give_identical_output() {
        let boxes = [bbox(0, 0, 10, 10), bbox(3, 3, 13, 13), bbox(30, 30, 40, 40)];
        let conf = [0.9, 0.95, 0.6];
        assert_eq!(suppress(&boxes, &conf, 0.5, 0.4), suppress(&boxes, &conf, 0.5, 0.4));
    }
}
