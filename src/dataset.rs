//! Labeled training data: CSV loading, the synthetic bootstrap corpus, and
//! stratified sampling helpers.

use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, SpamError};

pub const HAM: u8 = 0;
pub const SPAM: u8 = 1;

const BENIGN_TEMPLATES: [&str; 4] = [
    "Hey, are we meeting today?",
    "Your order has been shipped.",
    "See you tomorrow.",
    "Call me when free.",
];

const SPAM_TEMPLATES: [&str; 3] = [
    "Congratulations! You've won a prize. Click http://free.redeem",
    "URGENT: verify your account at http://secure-bank.example",
    "Buy meds cheap at http://cheappharma.example",
];

/// One dataset row. `message` is `None` for an empty cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledMessage {
    pub message: Option<String>,
    pub label: u8,
}

impl LabeledMessage {
    pub fn new(message: impl Into<String>, label: u8) -> Self {
        LabeledMessage {
            message: Some(message.into()),
            label,
        }
    }

    pub fn is_spam(&self) -> bool {
        self.label == SPAM
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticParams {
    pub samples: usize,
    pub spam_ratio: f64,
}

impl Default for SyntheticParams {
    fn default() -> Self {
        Self {
            samples: 4000,
            spam_ratio: 0.12,
        }
    }
}

/// Reads a `message,label` CSV. Extra columns are ignored; a missing column
/// or a label other than 0/1 makes the whole file malformed.
pub fn load_csv(path: &Path) -> Result<Vec<LabeledMessage>> {
    let mut reader = csv::Reader::from_path(path)?;

    let headers = reader.headers()?.clone();
    for column in ["message", "label"] {
        if !headers.iter().any(|h| h.trim() == column) {
            return Err(SpamError::MalformedDataset(format!(
                "{}: missing column '{column}'",
                path.display()
            )));
        }
    }

    let mut rows = Vec::new();
    for (line, record) in reader.deserialize::<LabeledMessage>().enumerate() {
        let row = record.map_err(|e| {
            SpamError::MalformedDataset(format!("{}: row {}: {e}", path.display(), line + 1))
        })?;
        if row.label != HAM && row.label != SPAM {
            return Err(SpamError::MalformedDataset(format!(
                "{}: row {}: label must be 0 or 1, got {}",
                path.display(),
                line + 1,
                row.label
            )));
        }
        rows.push(row);
    }

    Ok(rows)
}

/// Samples `params.samples` rows from the fixed template pools. The pools
/// are tiny, so the result has very little lexical diversity.
pub fn generate_synthetic(params: &SyntheticParams, seed: u64) -> Vec<LabeledMessage> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..params.samples)
        .map(|_| {
            if rng.random::<f64>() < params.spam_ratio {
                let template = SPAM_TEMPLATES[rng.random_range(0..SPAM_TEMPLATES.len())];
                LabeledMessage::new(template, SPAM)
            } else {
                let template = BENIGN_TEMPLATES[rng.random_range(0..BENIGN_TEMPLATES.len())];
                LabeledMessage::new(template, HAM)
            }
        })
        .collect()
}

/// Splits row indices into `(train, test)` keeping the label proportions.
/// Every class with at least two rows lands in both halves.
pub fn stratified_split(labels: &[u8], test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();

    for class in [HAM, SPAM] {
        let mut rows: Vec<usize> = (0..labels.len()).filter(|&i| labels[i] == class).collect();
        if rows.is_empty() {
            continue;
        }
        rows.shuffle(&mut rng);

        let mut n_test = (rows.len() as f64 * test_fraction).round() as usize;
        if rows.len() >= 2 {
            n_test = n_test.clamp(1, rows.len() - 1);
        } else {
            n_test = 0;
        }

        test.extend_from_slice(&rows[..n_test]);
        train.extend_from_slice(&rows[n_test..]);
    }

    train.shuffle(&mut rng);
    test.shuffle(&mut rng);
    (train, test)
}

/// Assigns each row to one of `k` folds, dealing every class out round-robin
/// in row order.
pub fn stratified_folds(labels: &[u8], k: usize) -> Vec<usize> {
    let mut seen = [0usize; 2];
    labels
        .iter()
        .map(|&label| {
            let slot = &mut seen[usize::from(label == SPAM)];
            let fold = *slot % k;
            *slot += 1;
            fold
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_message_label_columns() {
        let file = write_csv("message,label,ts\nhello there,0,x\nwin cash,1,y\n,0,z\n");
        let rows = load_csv(file.path()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], LabeledMessage::new("hello there", HAM));
        assert!(rows[1].is_spam());
        assert_eq!(rows[2].message, None);
    }

    #[test]
    fn missing_column_is_malformed() {
        let file = write_csv("text,label\nhello,0\n");
        assert!(matches!(
            load_csv(file.path()),
            Err(SpamError::MalformedDataset(_))
        ));
    }

    #[test]
    fn out_of_range_label_is_malformed() {
        let file = write_csv("message,label\nhello,2\n");
        assert!(matches!(
            load_csv(file.path()),
            Err(SpamError::MalformedDataset(_))
        ));
    }

    #[test]
    fn synthetic_rows_come_from_the_pools() {
        let rows = generate_synthetic(&SyntheticParams::default(), 42);
        assert_eq!(rows.len(), 4000);
        let spam = rows.iter().filter(|r| r.is_spam()).count();
        assert!((300..700).contains(&spam), "spam rows: {spam}");
        for row in &rows {
            let text = row.message.as_deref().unwrap();
            if row.is_spam() {
                assert!(SPAM_TEMPLATES.contains(&text));
            } else {
                assert!(BENIGN_TEMPLATES.contains(&text));
            }
        }
        assert_eq!(rows, generate_synthetic(&SyntheticParams::default(), 42));
    }

    #[test]
    fn split_keeps_class_balance() {
        let labels: Vec<u8> = (0..100).map(|i| u8::from(i % 10 == 0)).collect();
        let (train, test) = stratified_split(&labels, 0.2, 42);
        assert_eq!(train.len() + test.len(), 100);
        assert_eq!(test.len(), 20);
        assert_eq!(test.iter().filter(|&&i| labels[i] == SPAM).count(), 2);

        let mut all: Vec<usize> = train.iter().chain(&test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<_>>());
        assert_eq!((train.clone(), test.clone()), stratified_split(&labels, 0.2, 42));
    }

    #[test]
    fn folds_are_stratified() {
        let labels = [0, 1, 0, 1, 0, 1, 0, 0, 0];
        let folds = stratified_folds(&labels, 3);
        assert_eq!(folds, vec![0, 0, 1, 1, 2, 2, 0, 1, 2]);
    }
}
