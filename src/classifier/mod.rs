pub mod calibration;
pub mod svm;

pub use calibration::{CalibratedLinearSvc, PlattScaler};
pub use svm::{LinearSvc, SvmParams};

use crate::features::FeatureVector;

/// Supervised model producing a spam probability in `[0, 1]`.
pub trait SpamScorer {
    fn predict_probability(&self, x: &FeatureVector) -> f64;
}

/// Positive/negative counts of a label slice; labels are 0 (ham) or 1 (spam).
pub(crate) fn class_counts(labels: &[u8]) -> (usize, usize) {
    let spam = labels.iter().filter(|&&label| label == 1).count();
    (labels.len() - spam, spam)
}
