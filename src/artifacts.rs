//! The three fitted models and their on-disk slots.

use serde::de::DeserializeOwned;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::anomaly::IsolationForest;
use crate::classifier::CalibratedLinearSvc;
use crate::error::{Result, SpamError};
use crate::features::{TfidfVectorizer, Vectorizer};

pub const VECTORIZER_FILE: &str = "sms_tfidf.bin";
pub const CLASSIFIER_FILE: &str = "sms_svm_calibrated.bin";
pub const DETECTOR_FILE: &str = "sms_iso.bin";

const TEMP_SUFFIX: &str = ".tmp";
const BACKUP_SUFFIX: &str = ".bak";

/// Output of one training run. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedArtifacts {
    pub vectorizer: TfidfVectorizer,
    pub classifier: CalibratedLinearSvc,
    pub detector: IsolationForest,
}

/// Directory holding the vectorizer, classifier and detector slots.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        ArtifactStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn paths(&self) -> [PathBuf; 3] {
        [VECTORIZER_FILE, CLASSIFIER_FILE, DETECTOR_FILE].map(|name| self.dir.join(name))
    }

    /// Replaces the three slots as one set.
    ///
    /// Every model is encoded and written to a `.tmp` sibling first. The
    /// current slots are then moved aside to `.bak` siblings and the
    /// temporaries renamed into place. If any of those renames fails, the
    /// slots committed so far are removed and the backups moved back, so the
    /// directory holds the previous set again. Backups are deleted once all
    /// three new slots are in place.
    pub fn save(&self, artifacts: &TrainedArtifacts) -> Result<()> {
        let encoded = [
            bincode::serialize(&artifacts.vectorizer)?,
            bincode::serialize(&artifacts.classifier)?,
            bincode::serialize(&artifacts.detector)?,
        ];

        fs::create_dir_all(&self.dir)?;
        let targets = self.paths();
        let temps = targets.clone().map(|p| sibling(&p, TEMP_SUFFIX));
        let backups = targets.clone().map(|p| sibling(&p, BACKUP_SUFFIX));

        for (temp, bytes) in temps.iter().zip(&encoded) {
            if let Err(e) = fs::write(temp, bytes) {
                remove_all(&temps);
                return Err(e.into());
            }
        }

        if let Err(e) = commit(&temps, &targets, &backups) {
            remove_all(&temps);
            return Err(e);
        }
        remove_all(&backups);

        info!(dir = %self.dir.display(), "artifacts saved");
        Ok(())
    }

    /// Loads all three slots; any missing or undecodable slot is an error,
    /// and so is a set whose models disagree on the feature width.
    pub fn load(&self) -> Result<TrainedArtifacts> {
        let [vectorizer, classifier, detector] = self.paths();
        let artifacts = TrainedArtifacts {
            vectorizer: read_slot(&vectorizer)?,
            classifier: read_slot(&classifier)?,
            detector: read_slot(&detector)?,
        };
        artifacts.check_consistent().map_err(|reason| SpamError::ArtifactMismatch {
            dir: self.dir.clone(),
            reason,
        })?;
        info!(dir = %self.dir.display(), "artifacts loaded");
        Ok(artifacts)
    }
}

impl TrainedArtifacts {
    /// Checks that the classifier and detector were fitted on vectors of the
    /// width this vectorizer produces.
    pub fn check_consistent(&self) -> std::result::Result<(), String> {
        let width = self.vectorizer.dim();
        match self.classifier.dim() {
            Some(dim) if dim == width => {}
            Some(dim) => {
                return Err(format!(
                    "vectorizer emits {width} features, classifier expects {dim}"
                ));
            }
            None => return Err("classifier members disagree on feature width".to_string()),
        }
        if self.detector.dim() != width {
            return Err(format!(
                "vectorizer emits {width} features, detector expects {}",
                self.detector.dim()
            ));
        }
        Ok(())
    }
}

/// Moves the current slots to `backups`, then `temps` into the slots. On
/// failure every slot is put back the way it was.
fn commit(temps: &[PathBuf; 3], targets: &[PathBuf; 3], backups: &[PathBuf; 3]) -> Result<()> {
    let mut backed_up = [false; 3];
    for (i, (target, backup)) in targets.iter().zip(backups).enumerate() {
        match fs::rename(target, backup) {
            Ok(()) => backed_up[i] = true,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                roll_back(targets, backups, &backed_up, 0);
                return Err(e.into());
            }
        }
    }

    for (i, (temp, target)) in temps.iter().zip(targets).enumerate() {
        if let Err(e) = fs::rename(temp, target) {
            roll_back(targets, backups, &backed_up, i);
            return Err(e.into());
        }
    }
    Ok(())
}

/// Drops the first `committed` new slots and restores every backup.
fn roll_back(
    targets: &[PathBuf; 3],
    backups: &[PathBuf; 3],
    backed_up: &[bool; 3],
    committed: usize,
) {
    remove_all(&targets[..committed]);
    for ((target, backup), _) in targets
        .iter()
        .zip(backups)
        .zip(backed_up)
        .filter(|(_, moved)| **moved)
    {
        if let Err(e) = fs::rename(backup, target) {
            warn!(path = %target.display(), error = %e, "could not restore previous artifact");
        }
    }
}

fn sibling(target: &Path, suffix: &str) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn remove_all(paths: &[PathBuf]) {
    for path in paths {
        let removed = match fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
            Ok(_) => fs::remove_file(path),
            Err(e) => Err(e),
        };
        if let Err(e) = removed {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "could not remove stale artifact file");
            }
        }
    }
}

fn read_slot<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(SpamError::MissingArtifact(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };
    bincode::deserialize(&bytes).map_err(|e| SpamError::CorruptArtifact {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
