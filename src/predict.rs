//! Inference over a frozen artifact set.
//!
//! A [`Predictor`] is built once (load-then-serve) and only exposes `&self`
//! methods afterwards, so it can be shared across threads behind an `Arc`.

use serde::{Deserialize, Serialize};

use crate::anomaly::{IsolationForest, OutlierDetector};
use crate::artifacts::{ArtifactStore, TrainedArtifacts};
use crate::classifier::{CalibratedLinearSvc, SpamScorer};
use crate::decision::decide;
use crate::error::Result;
use crate::features::{TfidfVectorizer, Vectorizer};
use crate::normalize::Normalizer;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub label: u8,
    pub probability: f64,
    pub anomaly: bool,
    #[serde(rename = "cleanedText")]
    pub cleaned_text: String,
}

impl PredictionResult {
    pub fn is_spam(&self) -> bool {
        self.label == 1
    }
}

pub struct Predictor<V = TfidfVectorizer, C = CalibratedLinearSvc, D = IsolationForest> {
    normalizer: &'static Normalizer,
    vectorizer: V,
    classifier: C,
    detector: D,
    threshold: f64,
}

impl Predictor {
    pub fn from_artifacts(artifacts: TrainedArtifacts, threshold: f64) -> Self {
        Predictor::new(
            artifacts.vectorizer,
            artifacts.classifier,
            artifacts.detector,
            threshold,
        )
    }

    /// Loads every slot from `store`; fails if any is missing or corrupt, or
    /// if the models disagree on the feature width.
    pub fn load(store: &ArtifactStore, threshold: f64) -> Result<Self> {
        Ok(Predictor::from_artifacts(store.load()?, threshold))
    }
}

impl<V, C, D> Predictor<V, C, D>
where
    V: Vectorizer,
    C: SpamScorer,
    D: OutlierDetector,
{
    pub fn new(vectorizer: V, classifier: C, detector: D, threshold: f64) -> Self {
        Predictor {
            normalizer: Normalizer::english(),
            vectorizer,
            classifier,
            detector,
            threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn predict(&self, text: Option<&str>) -> PredictionResult {
        let cleaned_text = self.normalizer.normalize(text);
        let features = self.vectorizer.transform(&cleaned_text);

        let probability = self.classifier.predict_probability(&features);
        let anomaly = self.detector.is_outlier(&features);

        PredictionResult {
            label: decide(probability, anomaly, self.threshold),
            probability,
            anomaly,
            cleaned_text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureVector;

    struct Bag;

    impl Vectorizer for Bag {
        fn transform(&self, text: &str) -> FeatureVector {
            let n = text.split_whitespace().count() as f64;
            FeatureVector::new(1, vec![(0, n)])
        }

        fn dim(&self) -> usize {
            1
        }
    }

    struct Fixed(f64);

    impl SpamScorer for Fixed {
        fn predict_probability(&self, _: &FeatureVector) -> f64 {
            self.0
        }
    }

    struct LongMessages;

    impl OutlierDetector for LongMessages {
        fn score(&self, x: &FeatureVector) -> f64 {
            x.get(0)
        }

        fn is_outlier(&self, x: &FeatureVector) -> bool {
            self.score(x) > 3.0
        }
    }

    #[test]
    fn fuses_swapped_models() {
        let predictor = Predictor::new(Bag, Fixed(0.1), LongMessages, 0.45);

        let short = predictor.predict(Some("See you tomorrow."));
        assert_eq!(short.cleaned_text, "see tomorrow.");
        assert_eq!(short.label, 0);
        assert!(!short.anomaly);

        let long = predictor.predict(Some("one two three four five"));
        assert!(long.anomaly);
        assert_eq!(long.label, 1);
        assert_eq!(long.probability, 0.1);
    }

    #[test]
    fn missing_text_is_a_valid_request() {
        let predictor = Predictor::new(Bag, Fixed(0.9), LongMessages, 0.45);
        let result = predictor.predict(None);
        assert_eq!(result.cleaned_text, "");
        assert!(result.is_spam());
    }

    #[test]
    fn serializes_with_public_field_names() {
        let result = PredictionResult {
            label: 1,
            probability: 0.5,
            anomaly: false,
            cleaned_text: "x".to_string(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["cleanedText"], "x");
        assert_eq!(json["label"], 1);
    }
}
