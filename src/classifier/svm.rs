//! Linear support vector classifier.
//!
//! Squared-hinge loss with an L2 penalty, solved in the dual by coordinate
//! descent. The intercept is learned as the weight of a constant feature
//! equal to 1, so it is regularized like every other weight.

use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classifier::class_counts;
use crate::error::{Result, SpamError};
use crate::features::FeatureVector;

const INTERCEPT_SCALING: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SvmParams {
    /// Inverse regularization strength.
    pub c: f64,
    pub max_iter: usize,
    /// Stop once the projected-gradient spread of a sweep falls below this.
    pub tol: f64,
}

impl Default for SvmParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 5000,
            tol: 1e-4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearSvc {
    weights: Vec<f64>,
    intercept: f64,
}

impl LinearSvc {
    pub fn fit(x: &[&FeatureVector], y: &[u8], params: &SvmParams, seed: u64) -> Result<Self> {
        if x.len() != y.len() {
            return Err(SpamError::InsufficientData(format!(
                "{} vectors but {} labels",
                x.len(),
                y.len()
            )));
        }
        let (ham, spam) = class_counts(y);
        if ham == 0 || spam == 0 {
            return Err(SpamError::InsufficientData(format!(
                "classifier needs both classes, got {ham} ham and {spam} spam"
            )));
        }

        let dim = x[0].dim();
        let mut weights = vec![0.0; dim];
        let mut intercept = 0.0;
        let mut alpha = vec![0.0; x.len()];
        let sign: Vec<f64> = y
            .iter()
            .map(|&label| if label == 1 { 1.0 } else { -1.0 })
            .collect();

        let diag = 0.5 / params.c;
        let q_diag: Vec<f64> = x
            .iter()
            .map(|xi| xi.squared_norm() + INTERCEPT_SCALING * INTERCEPT_SCALING + diag)
            .collect();

        let mut order: Vec<usize> = (0..x.len()).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut iterations = 0;

        while iterations < params.max_iter {
            order.shuffle(&mut rng);
            let mut max_pg = f64::NEG_INFINITY;
            let mut min_pg = f64::INFINITY;

            for &i in &order {
                let margin = x[i].dot(&weights) + intercept * INTERCEPT_SCALING;
                let g = sign[i] * margin - 1.0 + diag * alpha[i];
                let pg = if alpha[i] == 0.0 { g.min(0.0) } else { g };

                max_pg = max_pg.max(pg);
                min_pg = min_pg.min(pg);

                if pg.abs() > 1e-12 {
                    let previous = alpha[i];
                    alpha[i] = (alpha[i] - g / q_diag[i]).max(0.0);
                    let step = (alpha[i] - previous) * sign[i];
                    for (idx, value) in x[i].iter() {
                        weights[idx] += step * value;
                    }
                    intercept += step * INTERCEPT_SCALING;
                }
            }

            iterations += 1;
            if max_pg - min_pg <= params.tol {
                break;
            }
        }

        debug!(iterations, samples = x.len(), "linear svc converged");

        Ok(LinearSvc {
            weights,
            intercept: intercept * INTERCEPT_SCALING,
        })
    }

    /// Signed distance to the separating hyperplane (up to scale).
    pub fn decision_function(&self, x: &FeatureVector) -> f64 {
        x.dot(&self.weights) + self.intercept
    }

    pub fn dim(&self) -> usize {
        self.weights.len()
    }

    pub fn predict(&self, x: &FeatureVector) -> u8 {
        u8::from(self.decision_function(x) > 0.0)
    }
}
