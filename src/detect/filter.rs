use crate::detect::backend::ModelFamily;
use crate::detect::result::{Detection, PersonDetection};

/// Keeps person-class detections strictly above a confidence threshold.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PersonFilter {
    person_class: u32,
    threshold: f32,
}

impl PersonFilter {
    pub fn new(person_class: u32, threshold: f32) -> Self {
        Self {
            person_class,
            threshold,
        }
    }

    /// Person class and default threshold of a model family.
    pub fn for_family(family: ModelFamily) -> Self {
        Self::new(family.person_class(), family.default_confidence_threshold())
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn person_class(&self) -> u32 {
        self.person_class
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// A detection exactly at the threshold is rejected.
    pub fn accepts(&self, detection: &Detection) -> bool {
        detection.class_id() == self.person_class && detection.confidence() > self.threshold
    }

    /// Filter preserving input order.
    pub fn filter<I>(&self, detections: I) -> Vec<PersonDetection>
    where
        I: IntoIterator<Item = Detection>,
    {
        detections
            .into_iter()
            .filter(|detection| self.accepts(detection))
            .map(PersonDetection::accepted)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::BoundingBox;

    fn det(class_id: u32, confidence: f32) -> Detection {
        Detection::new(BoundingBox::new(0, 0, 10, 10).unwrap(), class_id, confidence)
    }

    #[test]
    fn threshold_boundary_is_excluded() {
        let filter = PersonFilter::new(15, 0.4);
        assert!(!filter.accepts(&det(15, 0.4)));
        assert!(filter.accepts(&det(15, 0.4001)));
        assert!(!filter.accepts(&det(14, 0.99)));
    }

    #[test]
    fn output_is_exactly_the_eligible_subset() {
        for threshold in [0.0_f32, 0.25, 0.4, 0.5, 0.75, 0.99] {
            let filter = PersonFilter::new(0, threshold);
            let input: Vec<Detection> = (0..=20)
                .flat_map(|step| {
                    let confidence = step as f32 / 20.0;
                    [det(0, confidence), det(1, confidence)]
                })
                .collect();
            let kept = filter.filter(input.clone());
            let expected: Vec<&Detection> = input
                .iter()
                .filter(|d| d.class_id() == 0 && d.confidence() > threshold)
                .collect();
            assert_eq!(kept.len(), expected.len(), "threshold {threshold}");
            for (person, detection) in kept.iter().zip(expected) {
                assert_eq!(person.detection(), detection);
                assert!(person.confidence() > threshold);
            }
        }
    }

    #[test]
    fn order_is_preserved() {
        let filter = PersonFilter::for_family(ModelFamily::GridAnchor);
        let kept = filter.filter(vec![det(0, 0.6), det(2, 0.9), det(0, 0.95), det(0, 0.7)]);
        let confidences: Vec<f32> = kept.iter().map(|p| p.confidence()).collect();
        assert_eq!(confidences, vec![0.6, 0.95, 0.7]);
    }
}
