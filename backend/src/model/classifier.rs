use ndarray::ArrayView2;
use shared::{HealthLabel, Prediction};

use super::lstm::{CropHealthLstm, NUM_CLASSES};
use crate::features::{FEATURE_COUNT, SEQ_LENGTH};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClassifierError {
    #[error("Classifier expects a {expected:?} sequence, got {found:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },
}

/// Read-only wrapper around the network; safe to share between jobs.
#[derive(Debug, Clone)]
pub struct SequenceClassifier {
    network: CropHealthLstm,
    degraded: bool,
}

impl SequenceClassifier {
    pub fn new(network: CropHealthLstm) -> Self {
        Self {
            network,
            degraded: false,
        }
    }

    /// Randomly initialised network used when no trained weights exist.
    /// Output stays well formed but carries no signal.
    pub fn untrained() -> Self {
        let mut rng = rand::rng();
        Self {
            network: CropHealthLstm::random(&mut rng, FEATURE_COUNT),
            degraded: true,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn probabilities(
        &self,
        sequence: ArrayView2<'_, f32>,
    ) -> Result<[f64; NUM_CLASSES], ClassifierError> {
        let expected = (SEQ_LENGTH, self.network.input_size());
        if sequence.dim() != expected {
            return Err(ClassifierError::ShapeMismatch {
                expected,
                found: sequence.dim(),
            });
        }
        Ok(softmax(&self.network.forward(sequence)))
    }

    pub fn classify(&self, sequence: ArrayView2<'_, f32>) -> Result<Prediction, ClassifierError> {
        let probabilities = self.probabilities(sequence)?;
        Ok(calculate_result(&probabilities))
    }
}

pub fn softmax(logits: &[f32; NUM_CLASSES]) -> [f64; NUM_CLASSES] {
    let max = logits
        .iter()
        .map(|&v| f64::from(v))
        .fold(f64::NEG_INFINITY, f64::max);
    let mut out = [0.0; NUM_CLASSES];
    for (slot, &logit) in out.iter_mut().zip(logits.iter()) {
        *slot = (f64::from(logit) - max).exp();
    }
    let total: f64 = out.iter().sum();
    for slot in out.iter_mut() {
        *slot /= total;
    }
    out
}

/// Label is the most probable class, ties going to the lower class index.
pub fn calculate_result(probabilities: &[f64; NUM_CLASSES]) -> Prediction {
    let mut best = 0;
    for (i, &p) in probabilities.iter().enumerate().skip(1) {
        if p > probabilities[best] {
            best = i;
        }
    }
    let percentages = to_percentages(probabilities);
    Prediction {
        healthy: percentages[0],
        normal: percentages[1],
        stressed: percentages[2],
        confidence: percentages[best],
        label: HealthLabel::from_index(best).unwrap_or(HealthLabel::Healthy),
    }
}

/// Scales to 0-100 and rounds each class to one decimal on its own, so the
/// three values may add up to 99.9 or 100.1.
fn to_percentages(probabilities: &[f64; NUM_CLASSES]) -> [f64; NUM_CLASSES] {
    probabilities.map(|p| (p * 1000.0).round() / 10.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::lstm::tests::zero_state_dict;
    use crate::model::lstm::StateDict;
    use assert_matches::assert_matches;
    use ndarray::Array2;

    fn classifier_with_logits(logits: [f32; 3]) -> SequenceClassifier {
        let mut dict: StateDict = zero_state_dict(FEATURE_COUNT);
        dict.0.get_mut("classifier.3.bias").unwrap().data = logits.to_vec();
        SequenceClassifier::new(CropHealthLstm::from_state_dict(&dict, FEATURE_COUNT).unwrap())
    }

    fn total(p: &Prediction) -> f64 {
        p.healthy + p.normal + p.stressed
    }

    #[test]
    fn prediction_follows_most_probable_class() {
        let prediction = calculate_result(&[0.2, 0.5, 0.3]);
        assert_eq!(prediction.label, HealthLabel::Normal);
        assert_eq!(prediction.normal, 50.0);
        assert_eq!(prediction.confidence, 50.0);
        assert_eq!(prediction.healthy, 20.0);
        assert_eq!(prediction.stressed, 30.0);
    }

    #[test]
    fn exact_ties_resolve_to_lower_class_index() {
        let prediction = calculate_result(&[0.25, 0.375, 0.375]);
        assert_eq!(prediction.label, HealthLabel::Normal);

        let prediction = calculate_result(&[1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0]);
        assert_eq!(prediction.label, HealthLabel::Healthy);
        assert_eq!(prediction.confidence, prediction.healthy);
        assert_eq!(prediction.healthy, 33.3);
        assert!((total(&prediction) - 100.0).abs() <= 0.1 + 1e-9);
    }

    #[test]
    fn each_percentage_is_rounded_independently() {
        let prediction = calculate_result(&[0.33349, 0.33349, 0.33302]);
        assert_eq!(prediction.healthy, 33.3);
        assert_eq!(prediction.normal, 33.3);
        assert_eq!(prediction.stressed, 33.3);
        assert_eq!(prediction.confidence, 33.3);
        assert_eq!(prediction.label, HealthLabel::Healthy);

        let prediction = calculate_result(&[0.12351, 0.5, 0.37649]);
        assert_eq!(prediction.healthy, 12.4);
        assert_eq!(prediction.stressed, 37.6);
        assert_eq!(prediction.confidence, 50.0);
        assert!((total(&prediction) - 100.0).abs() <= 0.1 + 1e-9);
    }

    #[test]
    fn softmax_is_a_distribution() {
        let probabilities = softmax(&[2.0, -1.0, 0.5]);
        assert!((probabilities.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(probabilities[0] > probabilities[2] && probabilities[2] > probabilities[1]);

        let large = softmax(&[1000.0, 1000.0, -1000.0]);
        assert!(large.iter().all(|p| p.is_finite()));
        assert!((large[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn classify_uses_network_output() {
        let classifier = classifier_with_logits([0.0, 0.0, 3.0]);
        let prediction = classifier.classify(Array2::zeros((12, 5)).view()).unwrap();
        assert_eq!(prediction.label, HealthLabel::Stressed);
        assert!(prediction.stressed > 90.0);
        assert!((total(&prediction) - 100.0).abs() <= 0.1 + 1e-9);
        assert!(!classifier.is_degraded());
    }

    #[test]
    fn wrong_shape_is_rejected() {
        let classifier = classifier_with_logits([0.0, 0.0, 0.0]);
        assert_matches!(
            classifier.classify(Array2::zeros((11, 5)).view()),
            Err(ClassifierError::ShapeMismatch { expected: (12, 5), found: (11, 5) })
        );
        assert_matches!(
            classifier.classify(Array2::zeros((12, 4)).view()),
            Err(ClassifierError::ShapeMismatch { .. })
        );
    }

    #[test]
    fn untrained_classifier_still_produces_a_prediction() {
        let classifier = SequenceClassifier::untrained();
        assert!(classifier.is_degraded());

        let input = Array2::from_shape_fn((12, 5), |(t, f)| (t + f) as f32 * 0.1);
        let prediction = classifier.classify(input.view()).unwrap();
        assert!((total(&prediction) - 100.0).abs() <= 0.1 + 1e-9);
        assert_eq!(prediction.confidence, prediction.percentage(prediction.label));
        for label in [HealthLabel::Healthy, HealthLabel::Normal, HealthLabel::Stressed] {
            assert!(prediction.percentage(label) <= prediction.confidence);
        }
    }
}
