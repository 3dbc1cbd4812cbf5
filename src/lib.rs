//! SMS spam filtering with a calibrated linear classifier and an isolation
//! forest trained on legitimate traffic, fused by an OR rule.

pub mod anomaly;
pub mod artifacts;
pub mod classifier;
pub mod config;
pub mod dataset;
pub mod decision;
pub mod error;
pub mod features;
pub mod normalize;
pub mod predict;
pub mod train;

pub use artifacts::{ArtifactStore, TrainedArtifacts};
pub use config::Config;
pub use decision::{DEFAULT_THRESHOLD, decide};
pub use error::{Result, SpamError};
pub use normalize::{Normalizer, URL_TOKEN, normalize};
pub use predict::{PredictionResult, Predictor};
pub use train::{Trainer, TrainingReport, TrainingStage};
