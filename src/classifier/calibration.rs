//! Probability calibration of margin scores.
//!
//! [`PlattScaler`] fits `p = 1 / (1 + exp(a * f + b))` to held-out margins.
//! [`CalibratedLinearSvc`] trains one SVM per stratified fold, calibrates it on
//! the fold it did not see, and averages the members' probabilities.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classifier::svm::{LinearSvc, SvmParams};
use crate::classifier::{SpamScorer, class_counts};
use crate::dataset::stratified_folds;
use crate::error::{Result, SpamError};
use crate::features::FeatureVector;

const NEWTON_MAX_ITER: usize = 100;
const MIN_STEP: f64 = 1e-10;
const HESSIAN_RIDGE: f64 = 1e-12;
const GRADIENT_EPS: f64 = 1e-5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlattScaler {
    a: f64,
    b: f64,
}

impl PlattScaler {
    /// Fits the sigmoid with Platt's smoothed targets, using Newton's method
    /// with a backtracking line search.
    pub fn fit(scores: &[f64], labels: &[u8]) -> Self {
        let (prior0, prior1) = class_counts(labels);
        let (prior0, prior1) = (prior0 as f64, prior1 as f64);
        let hi_target = (prior1 + 1.0) / (prior1 + 2.0);
        let lo_target = 1.0 / (prior0 + 2.0);
        let targets: Vec<f64> = labels
            .iter()
            .map(|&label| if label == 1 { hi_target } else { lo_target })
            .collect();

        let mut a = 0.0;
        let mut b = ((prior0 + 1.0) / (prior1 + 1.0)).ln();
        let mut fval = objective(scores, &targets, a, b);

        for _ in 0..NEWTON_MAX_ITER {
            let (mut h11, mut h22, mut h21) = (HESSIAN_RIDGE, HESSIAN_RIDGE, 0.0);
            let (mut g1, mut g2) = (0.0, 0.0);

            for (&f, &t) in scores.iter().zip(&targets) {
                let z = f * a + b;
                let (p, q) = if z >= 0.0 {
                    let e = (-z).exp();
                    (e / (1.0 + e), 1.0 / (1.0 + e))
                } else {
                    let e = z.exp();
                    (1.0 / (1.0 + e), e / (1.0 + e))
                };
                let d2 = p * q;
                h11 += f * f * d2;
                h22 += d2;
                h21 += f * d2;
                let d1 = t - p;
                g1 += f * d1;
                g2 += d1;
            }

            if g1.abs() < GRADIENT_EPS && g2.abs() < GRADIENT_EPS {
                break;
            }

            let det = h11 * h22 - h21 * h21;
            let da = -(h22 * g1 - h21 * g2) / det;
            let db = -(-h21 * g1 + h11 * g2) / det;
            let gd = g1 * da + g2 * db;

            let mut step = 1.0;
            while step >= MIN_STEP {
                let (new_a, new_b) = (a + step * da, b + step * db);
                let new_f = objective(scores, &targets, new_a, new_b);
                if new_f < fval + 1e-4 * step * gd {
                    a = new_a;
                    b = new_b;
                    fval = new_f;
                    break;
                }
                step /= 2.0;
            }

            if step < MIN_STEP {
                debug!("platt line search stalled");
                break;
            }
        }

        PlattScaler { a, b }
    }

    pub fn probability(&self, score: f64) -> f64 {
        let z = score * self.a + self.b;
        if z >= 0.0 {
            let e = (-z).exp();
            e / (1.0 + e)
        } else {
            1.0 / (1.0 + z.exp())
        }
    }
}

/// Negative log-likelihood of the sigmoid, computed without overflow.
fn objective(scores: &[f64], targets: &[f64], a: f64, b: f64) -> f64 {
    scores
        .iter()
        .zip(targets)
        .map(|(&f, &t)| {
            let z = f * a + b;
            if z >= 0.0 {
                t * z + (-z).exp().ln_1p()
            } else {
                (t - 1.0) * z + z.exp().ln_1p()
            }
        })
        .sum()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CalibratedMember {
    svc: LinearSvc,
    scaler: PlattScaler,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibratedLinearSvc {
    members: Vec<CalibratedMember>,
}

impl CalibratedLinearSvc {
    pub fn fit(
        x: &[&FeatureVector],
        y: &[u8],
        svm: &SvmParams,
        folds: usize,
        seed: u64,
    ) -> Result<Self> {
        let (ham, spam) = class_counts(y);
        if folds < 2 {
            return Err(SpamError::Config(format!(
                "calibration needs at least 2 folds, got {folds}"
            )));
        }
        if ham < folds || spam < folds {
            return Err(SpamError::InsufficientData(format!(
                "{folds}-fold calibration needs {folds} samples per class, got {ham} ham and {spam} spam"
            )));
        }

        let assignment = stratified_folds(y, folds);
        let mut members = Vec::with_capacity(folds);

        for fold in 0..folds {
            let mut train_x = Vec::new();
            let mut train_y = Vec::new();
            let mut held_x = Vec::new();
            let mut held_y = Vec::new();
            for (i, &f) in assignment.iter().enumerate() {
                if f == fold {
                    held_x.push(x[i]);
                    held_y.push(y[i]);
                } else {
                    train_x.push(x[i]);
                    train_y.push(y[i]);
                }
            }

            let svc = LinearSvc::fit(&train_x, &train_y, svm, seed.wrapping_add(fold as u64))?;
            let scores: Vec<f64> = held_x.iter().map(|v| svc.decision_function(v)).collect();
            let scaler = PlattScaler::fit(&scores, &held_y);

            debug!(
                fold,
                train = train_x.len(),
                held_out = held_x.len(),
                a = scaler.a,
                b = scaler.b,
                "calibrated fold"
            );
            members.push(CalibratedMember { svc, scaler });
        }

        Ok(CalibratedLinearSvc { members })
    }

    pub fn members(&self) -> usize {
        self.members.len()
    }

    /// Feature width shared by every member, or `None` when the members
    /// disagree or there are none.
    pub fn dim(&self) -> Option<usize> {
        let first = self.members.first()?.svc.dim();
        self.members
            .iter()
            .all(|m| m.svc.dim() == first)
            .then_some(first)
    }
}

impl SpamScorer for CalibratedLinearSvc {
    fn predict_probability(&self, x: &FeatureVector) -> f64 {
        if self.members.is_empty() {
            return 0.0;
        }
        let total: f64 = self
            .members
            .iter()
            .map(|m| m.scaler.probability(m.svc.decision_function(x)))
            .sum();
        (total / self.members.len() as f64).clamp(0.0, 1.0)
    }
}
