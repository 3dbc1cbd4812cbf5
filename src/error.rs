use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpamError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Artifact encoding error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Dataset not found: {}", .0.display())]
    DatasetNotFound(PathBuf),

    #[error("Malformed dataset: {0}")]
    MalformedDataset(String),

    #[error("Empty vocabulary: no terms survived normalization")]
    EmptyVocabulary,

    #[error("Insufficient training data: {0}")]
    InsufficientData(String),

    #[error("Missing artifact: {}", .0.display())]
    MissingArtifact(PathBuf),

    #[error("Corrupt artifact {}: {reason}", .path.display())]
    CorruptArtifact { path: PathBuf, reason: String },

    #[error("Mismatched artifacts in {}: {reason}", .dir.display())]
    ArtifactMismatch { dir: PathBuf, reason: String },
}

pub type Result<T> = std::result::Result<T, SpamError>;
