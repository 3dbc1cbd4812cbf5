//! Offline training run.
//!
//! Stages run strictly in order:
//! dataset -> normalize -> vectorizer -> split -> detector (ham only)
//! -> calibrated classifier -> persist. Any failure aborts the run before
//! anything is written.

use std::fmt;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::anomaly::{IsolationForest, OutlierDetector};
use crate::artifacts::{ArtifactStore, TrainedArtifacts};
use crate::classifier::{CalibratedLinearSvc, SpamScorer};
use crate::config::Config;
use crate::dataset::{self, HAM, LabeledMessage, SPAM};
use crate::decision::decide;
use crate::error::{Result, SpamError};
use crate::features::{FeatureVector, TfidfVectorizer, Vectorizer};
use crate::normalize::Normalizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingStage {
    Idle,
    LoadOrGenerateDataset,
    NormalizeAll,
    FitExtractor,
    SplitTrainTest,
    FitDetectorOnHamOnly,
    FitClassifierCalibrated,
    PersistArtifacts,
    Done,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DatasetSource {
    Csv(PathBuf),
    Synthetic { samples: usize },
}

impl fmt::Display for DatasetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetSource::Csv(path) => write!(f, "csv:{}", path.display()),
            DatasetSource::Synthetic { samples } => write!(f, "synthetic:{samples}"),
        }
    }
}

/// Confusion counts of the fused decision on the held-out split.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Evaluation {
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
    pub anomalies: usize,
}

impl Evaluation {
    pub fn record(&mut self, actual: u8, predicted: u8, anomaly: bool) {
        match (actual, predicted) {
            (SPAM, SPAM) => self.true_positives += 1,
            (HAM, SPAM) => self.false_positives += 1,
            (SPAM, _) => self.false_negatives += 1,
            _ => self.true_negatives += 1,
        }
        if anomaly {
            self.anomalies += 1;
        }
    }

    pub fn total(&self) -> usize {
        self.true_positives + self.false_positives + self.true_negatives + self.false_negatives
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positives + self.true_negatives, self.total())
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 { 0.0 } else { 2.0 * p * r / (p + r) }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub source: DatasetSource,
    pub samples: usize,
    pub spam_samples: usize,
    pub vocabulary_size: usize,
    pub train_size: usize,
    pub test_size: usize,
    pub evaluation: Evaluation,
}

pub struct Trainer {
    config: Config,
    normalizer: &'static Normalizer,
    stage: TrainingStage,
}

impl Trainer {
    pub fn new(config: Config) -> Self {
        Trainer {
            config,
            normalizer: Normalizer::english(),
            stage: TrainingStage::Idle,
        }
    }

    pub fn stage(&self) -> TrainingStage {
        self.stage
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn enter(&mut self, stage: TrainingStage) {
        info!(stage = ?stage, "training stage");
        self.stage = stage;
    }

    /// Runs every stage and persists the artifacts through `store`.
    pub fn run(&mut self, store: &ArtifactStore) -> Result<TrainingReport> {
        let (artifacts, report) = self.fit()?;
        self.enter(TrainingStage::PersistArtifacts);
        store.save(&artifacts)?;
        self.enter(TrainingStage::Done);
        Ok(report)
    }

    /// Runs every stage except persistence.
    pub fn fit(&mut self) -> Result<(TrainedArtifacts, TrainingReport)> {
        self.config.validate()?;

        self.enter(TrainingStage::LoadOrGenerateDataset);
        let (rows, source) = self.load_or_generate()?;
        self.fit_rows(&rows, source)
    }

    /// Trains on rows already in memory.
    pub fn fit_rows(
        &mut self,
        rows: &[LabeledMessage],
        source: DatasetSource,
    ) -> Result<(TrainedArtifacts, TrainingReport)> {
        self.config.validate()?;
        if let Some(row) = rows.iter().find(|r| r.label != HAM && r.label != SPAM) {
            return Err(SpamError::MalformedDataset(format!(
                "label must be 0 or 1, got {}",
                row.label
            )));
        }
        let labels: Vec<u8> = rows.iter().map(|r| r.label).collect();
        let spam_samples = labels.iter().filter(|&&l| l == SPAM).count();
        info!(%source, samples = rows.len(), spam = spam_samples, "dataset ready");

        self.enter(TrainingStage::NormalizeAll);
        let cleaned: Vec<String> = rows
            .iter()
            .map(|r| self.normalizer.normalize(r.message.as_deref()))
            .collect();

        self.enter(TrainingStage::FitExtractor);
        let vectorizer = TfidfVectorizer::fit(&cleaned, &self.config.vectorizer)?;
        let vectors: Vec<FeatureVector> = cleaned.iter().map(|c| vectorizer.transform(c)).collect();
        info!(vocabulary = vectorizer.vocabulary_len(), "vectorizer fitted");

        self.enter(TrainingStage::SplitTrainTest);
        let (train_idx, test_idx) =
            dataset::stratified_split(&labels, self.config.test_fraction, self.config.seed);
        let train_x: Vec<&FeatureVector> = train_idx.iter().map(|&i| &vectors[i]).collect();
        let train_y: Vec<u8> = train_idx.iter().map(|&i| labels[i]).collect();
        info!(train = train_idx.len(), test = test_idx.len(), "split");

        self.enter(TrainingStage::FitDetectorOnHamOnly);
        let ham_x: Vec<&FeatureVector> = train_x
            .iter()
            .zip(&train_y)
            .filter(|&(_, &label)| label == HAM)
            .map(|(&x, _)| x)
            .collect();
        let detector = IsolationForest::fit(&ham_x, &self.config.isolation, self.config.seed)?;

        self.enter(TrainingStage::FitClassifierCalibrated);
        let classifier = CalibratedLinearSvc::fit(
            &train_x,
            &train_y,
            &self.config.svm,
            self.config.calibration_folds,
            self.config.seed,
        )?;

        let mut evaluation = Evaluation::default();
        for &i in &test_idx {
            let probability = classifier.predict_probability(&vectors[i]);
            let anomaly = detector.is_outlier(&vectors[i]);
            let predicted = decide(probability, anomaly, self.config.threshold);
            evaluation.record(labels[i], predicted, anomaly);
        }
        info!(
            accuracy = evaluation.accuracy(),
            precision = evaluation.precision(),
            recall = evaluation.recall(),
            f1 = evaluation.f1(),
            anomalies = evaluation.anomalies,
            "held-out evaluation"
        );

        let report = TrainingReport {
            source,
            samples: rows.len(),
            spam_samples,
            vocabulary_size: vectorizer.vocabulary_len(),
            train_size: train_idx.len(),
            test_size: test_idx.len(),
            evaluation,
        };
        let artifacts = TrainedArtifacts {
            vectorizer,
            classifier,
            detector,
        };
        Ok((artifacts, report))
    }

    fn load_or_generate(&self) -> Result<(Vec<LabeledMessage>, DatasetSource)> {
        match self.config.dataset.as_deref() {
            Some(path) if path.exists() => {
                let rows = dataset::load_csv(path)?;
                Ok((rows, DatasetSource::Csv(path.to_path_buf())))
            }
            Some(path) if !self.config.synthetic_fallback => {
                Err(SpamError::DatasetNotFound(path.to_path_buf()))
            }
            Some(path) => {
                warn!(path = %path.display(), "dataset not found, generating synthetic data");
                Ok(self.synthetic())
            }
            None => Ok(self.synthetic()),
        }
    }

    fn synthetic(&self) -> (Vec<LabeledMessage>, DatasetSource) {
        let params = &self.config.synthetic;
        let rows = dataset::generate_synthetic(params, self.config.seed);
        let source = DatasetSource::Synthetic {
            samples: rows.len(),
        };
        (rows, source)
    }
}

/// Trains with `config` and persists into `config.model_dir`.
pub fn train_and_save(config: Config) -> Result<TrainingReport> {
    let store = ArtifactStore::new(config.model_dir.clone());
    Trainer::new(config).run(&store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluation_metrics() {
        let mut eval = Evaluation::default();
        eval.record(SPAM, SPAM, false);
        eval.record(SPAM, HAM, false);
        eval.record(HAM, HAM, false);
        eval.record(HAM, SPAM, true);
        assert_eq!(eval.total(), 4);
        assert_eq!(eval.accuracy(), 0.5);
        assert_eq!(eval.precision(), 0.5);
        assert_eq!(eval.recall(), 0.5);
        assert_eq!(eval.f1(), 0.5);
        assert_eq!(eval.anomalies, 1);
    }

    #[test]
    fn empty_evaluation_is_zero() {
        let eval = Evaluation::default();
        assert_eq!(eval.accuracy(), 0.0);
        assert_eq!(eval.f1(), 0.0);
    }

    #[test]
    fn in_memory_rows_still_validate_config() {
        let mut config = Config::default();
        config.svm.c = 0.0;
        let rows = dataset::generate_synthetic(&config.synthetic, config.seed);
        let mut trainer = Trainer::new(config);
        let source = DatasetSource::Synthetic { samples: rows.len() };
        assert!(matches!(
            trainer.fit_rows(&rows, source),
            Err(SpamError::Config(_))
        ));
        assert_eq!(trainer.stage(), TrainingStage::Idle);
    }

    #[test]
    fn missing_dataset_without_fallback_is_fatal() {
        let config = Config {
            dataset: Some(PathBuf::from("/nonexistent/sms.csv")),
            synthetic_fallback: false,
            ..Config::default()
        };
        let mut trainer = Trainer::new(config);
        assert!(matches!(trainer.fit(), Err(SpamError::DatasetNotFound(_))));
        assert_eq!(trainer.stage(), TrainingStage::LoadOrGenerateDataset);
    }
}
