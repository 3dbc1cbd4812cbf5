use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::anomaly::IsolationParams;
use crate::classifier::SvmParams;
use crate::dataset::SyntheticParams;
use crate::decision::DEFAULT_THRESHOLD;
use crate::error::{Result, SpamError};
use crate::features::TfidfParams;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the three artifact slots.
    pub model_dir: PathBuf,
    /// `message,label` CSV; synthetic data is generated when absent.
    pub dataset: Option<PathBuf>,
    /// Generate synthetic data when `dataset` points at a missing file.
    pub synthetic_fallback: bool,
    pub seed: u64,
    pub test_fraction: f64,
    /// Decision threshold on the calibrated spam probability.
    pub threshold: f64,
    pub calibration_folds: usize,
    pub synthetic: SyntheticParams,
    pub vectorizer: TfidfParams,
    pub svm: SvmParams,
    pub isolation: IsolationParams,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// "compact" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            dataset: None,
            synthetic_fallback: true,
            seed: 42,
            test_fraction: 0.2,
            threshold: DEFAULT_THRESHOLD,
            calibration_folds: 3,
            synthetic: SyntheticParams::default(),
            vectorizer: TfidfParams::default(),
            svm: SvmParams::default(),
            isolation: IsolationParams::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| SpamError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(|e| SpamError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| -> Result<()> { Err(SpamError::Config(msg)) };

        if !(0.0..=1.0).contains(&self.threshold) {
            return invalid(format!("threshold must be in [0, 1], got {}", self.threshold));
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return invalid(format!(
                "test_fraction must be in (0, 1), got {}",
                self.test_fraction
            ));
        }
        if self.calibration_folds < 2 {
            return invalid(format!(
                "calibration_folds must be at least 2, got {}",
                self.calibration_folds
            ));
        }
        if !(0.0..=1.0).contains(&self.synthetic.spam_ratio) {
            return invalid(format!(
                "synthetic.spam_ratio must be in [0, 1], got {}",
                self.synthetic.spam_ratio
            ));
        }
        if self.vectorizer.max_features == 0 {
            return invalid("vectorizer.max_features must be positive".to_string());
        }
        let (min_n, max_n) = self.vectorizer.ngram_range;
        if min_n == 0 || min_n > max_n {
            return invalid(format!("vectorizer.ngram_range ({min_n}, {max_n}) is empty"));
        }
        if self.svm.c <= 0.0 || self.svm.max_iter == 0 {
            return invalid("svm.c and svm.max_iter must be positive".to_string());
        }
        if self.isolation.n_estimators == 0 || self.isolation.max_samples < 2 {
            return invalid(
                "isolation.n_estimators must be positive and isolation.max_samples at least 2"
                    .to_string(),
            );
        }
        if !(self.isolation.contamination > 0.0 && self.isolation.contamination <= 0.5) {
            return invalid(format!(
                "isolation.contamination must be in (0, 0.5], got {}",
                self.isolation.contamination
            ));
        }
        if !matches!(self.logging.format.as_str(), "compact" | "json") {
            return invalid(format!(
                "logging.format must be \"compact\" or \"json\", got {:?}",
                self.logging.format
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.threshold, 0.45);
        assert_eq!(config.isolation.contamination, 0.02);
        assert_eq!(config.vectorizer.max_features, 2000);
    }

    #[test]
    fn partial_sections_override() {
        let config = Config::from_toml(
            r#"
            model_dir = "/tmp/models"
            threshold = 0.6

            [vectorizer]
            ngram_range = [1, 1]

            [isolation]
            contamination = 0.05
            "#,
        )
        .unwrap();
        assert_eq!(config.model_dir, PathBuf::from("/tmp/models"));
        assert_eq!(config.threshold, 0.6);
        assert_eq!(config.vectorizer.ngram_range, (1, 1));
        assert_eq!(config.vectorizer.max_features, 2000);
        assert_eq!(config.isolation.contamination, 0.05);
        assert_eq!(config.isolation.n_estimators, 200);
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(Config::from_toml("threshold = 1.5").is_err());
        assert!(Config::from_toml("calibration_folds = 1").is_err());
        assert!(Config::from_toml("[isolation]\ncontamination = 0.9").is_err());
        assert!(Config::from_toml("[logging]\nformat = \"xml\"").is_err());
    }
}
