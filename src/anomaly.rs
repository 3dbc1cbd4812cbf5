//! Isolation forest over sparse feature vectors.
//!
//! Trained only on legitimate traffic. A message is an outlier when it is
//! isolated in fewer splits than all but `contamination` of the training set.

use rand::{Rng, SeedableRng, rngs::StdRng, seq::index};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{Result, SpamError};
use crate::features::FeatureVector;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Unsupervised detector of vectors that fall outside the training distribution.
pub trait OutlierDetector {
    /// Anomaly score in `(0, 1]`; higher is more anomalous.
    fn score(&self, x: &FeatureVector) -> f64;

    fn is_outlier(&self, x: &FeatureVector) -> bool;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationParams {
    pub n_estimators: usize,
    pub max_samples: usize,
    /// Expected share of outliers in the training data.
    pub contamination: f64,
}

impl Default for IsolationParams {
    fn default() -> Self {
        Self {
            n_estimators: 200,
            max_samples: 256,
            contamination: 0.02,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Split {
        feature: u32,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        size: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn grow(data: &[&FeatureVector], sample: Vec<usize>, max_depth: usize, rng: &mut StdRng) -> Self {
        let mut tree = IsolationTree { nodes: Vec::new() };
        tree.build(data, sample, 0, max_depth, rng);
        tree
    }

    fn build(
        &mut self,
        data: &[&FeatureVector],
        rows: Vec<usize>,
        depth: usize,
        max_depth: usize,
        rng: &mut StdRng,
    ) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { size: rows.len() });

        if depth >= max_depth || rows.len() <= 1 {
            return id;
        }

        let candidates = splittable_features(data, &rows);
        if candidates.is_empty() {
            return id;
        }

        let (feature, (lo, hi)) = candidates[rng.random_range(0..candidates.len())];
        let threshold = rng.random_range(lo..hi);
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&row| data[row].get(feature as usize) <= threshold);

        let left = self.build(data, left_rows, depth + 1, max_depth, rng);
        let right = self.build(data, right_rows, depth + 1, max_depth, rng);
        self.nodes[id] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    fn path_length(&self, x: &FeatureVector) -> f64 {
        let mut id = 0;
        let mut depth = 0.0;
        loop {
            match self.nodes[id] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if x.get(feature as usize) <= threshold {
                        left
                    } else {
                        right
                    };
                    depth += 1.0;
                }
                Node::Leaf { size } => return depth + average_path_length(size),
            }
        }
    }
}

/// Features whose value differs across `rows`, with their `(min, max)`,
/// ordered by feature index.
fn splittable_features(data: &[&FeatureVector], rows: &[usize]) -> Vec<(u32, (f64, f64))> {
    let mut stats: BTreeMap<u32, (f64, f64, usize)> = BTreeMap::new();
    for &row in rows {
        for (idx, value) in data[row].iter() {
            let entry = stats
                .entry(idx as u32)
                .or_insert((f64::INFINITY, f64::NEG_INFINITY, 0));
            entry.0 = entry.0.min(value);
            entry.1 = entry.1.max(value);
            entry.2 += 1;
        }
    }

    stats
        .into_iter()
        .filter_map(|(feature, (mut lo, mut hi, present))| {
            // rows without an entry hold an implicit zero
            if present < rows.len() {
                lo = lo.min(0.0);
                hi = hi.max(0.0);
            }
            (hi > lo).then_some((feature, (lo, hi)))
        })
        .collect()
}

/// Expected path length of an unsuccessful search in a binary search tree of
/// `n` points.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Linear-interpolated percentile, `q` in `[0, 100]`.
fn percentile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = (q / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    dim: usize,
    sample_size: usize,
    threshold: f64,
}

impl IsolationForest {
    pub fn fit(data: &[&FeatureVector], params: &IsolationParams, seed: u64) -> Result<Self> {
        if data.len() < 2 {
            return Err(SpamError::InsufficientData(format!(
                "anomaly detector needs at least 2 legitimate samples, got {}",
                data.len()
            )));
        }
        if params.n_estimators == 0 || params.max_samples < 2 {
            return Err(SpamError::Config(
                "isolation forest needs at least one tree and max_samples >= 2".to_string(),
            ));
        }
        if !(params.contamination > 0.0 && params.contamination <= 0.5) {
            return Err(SpamError::Config(format!(
                "contamination must be in (0, 0.5], got {}",
                params.contamination
            )));
        }

        let sample_size = params.max_samples.min(data.len());
        let max_depth = (sample_size as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(seed);

        let trees = (0..params.n_estimators)
            .map(|_| {
                let sample = index::sample(&mut rng, data.len(), sample_size).into_vec();
                IsolationTree::grow(data, sample, max_depth, &mut rng)
            })
            .collect();

        let mut forest = IsolationForest {
            trees,
            dim: data[0].dim(),
            sample_size,
            threshold: f64::INFINITY,
        };

        let scores: Vec<f64> = data.iter().map(|x| forest.score(x)).collect();
        forest.threshold = percentile(&scores, 100.0 * (1.0 - params.contamination));

        debug!(
            trees = forest.trees.len(),
            sample_size,
            threshold = forest.threshold,
            "isolation forest fitted"
        );
        Ok(forest)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Width of the vectors the forest was grown on.
    pub fn dim(&self) -> usize {
        self.dim
    }
}

impl OutlierDetector for IsolationForest {
    fn score(&self, x: &FeatureVector) -> f64 {
        if self.trees.is_empty() {
            return 0.5;
        }
        let mean_depth =
            self.trees.iter().map(|t| t.path_length(x)).sum::<f64>() / self.trees.len() as f64;
        2f64.powf(-mean_depth / average_path_length(self.sample_size))
    }

    fn is_outlier(&self, x: &FeatureVector) -> bool {
        self.score(x) > self.threshold
    }
}
