//! Sparse feature vectors and the TF-IDF vectorizer.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use crate::error::{Result, SpamError};

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\w\w+\b").expect("word pattern is valid"));

/// Sparse vector of fixed dimensionality. Entries are sorted by index and
/// never hold explicit zeros.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    dim: usize,
    entries: Vec<(u32, f64)>,
}

impl FeatureVector {
    pub fn new(dim: usize, mut entries: Vec<(u32, f64)>) -> Self {
        entries.retain(|&(idx, value)| (idx as usize) < dim && value != 0.0);
        entries.sort_by_key(|&(idx, _)| idx);
        entries.dedup_by_key(|&mut (idx, _)| idx);
        FeatureVector { dim, entries }
    }

    pub fn zeros(dim: usize) -> Self {
        FeatureVector {
            dim,
            entries: Vec::new(),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    pub fn is_zero(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.entries.iter().map(|&(idx, value)| (idx as usize, value))
    }

    pub fn get(&self, idx: usize) -> f64 {
        self.entries
            .binary_search_by_key(&(idx as u32), |&(i, _)| i)
            .map(|pos| self.entries[pos].1)
            .unwrap_or(0.0)
    }

    pub fn dot(&self, dense: &[f64]) -> f64 {
        self.iter()
            .map(|(idx, value)| dense.get(idx).copied().unwrap_or(0.0) * value)
            .sum()
    }

    pub fn squared_norm(&self) -> f64 {
        self.entries.iter().map(|&(_, v)| v * v).sum()
    }
}

/// Maps canonical text to a vector in a frozen feature space.
pub trait Vectorizer {
    fn transform(&self, text: &str) -> FeatureVector;

    fn dim(&self) -> usize;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TfidfParams {
    pub max_features: usize,
    pub ngram_range: (usize, usize),
}

impl Default for TfidfParams {
    fn default() -> Self {
        Self {
            max_features: 2000,
            ngram_range: (1, 2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    vocabulary: BTreeMap<String, u32>,
    idf: Vec<f64>,
    ngram_range: (usize, usize),
}

impl TfidfVectorizer {
    /// Learns the vocabulary and idf weights from `corpus`. Keeps the
    /// `max_features` terms with the highest total count; the retained terms
    /// are indexed in lexicographic order.
    pub fn fit<S: AsRef<str>>(corpus: &[S], params: &TfidfParams) -> Result<Self> {
        let (min_n, max_n) = params.ngram_range;
        if min_n == 0 || min_n > max_n {
            return Err(SpamError::Config(format!(
                "invalid ngram_range ({min_n}, {max_n})"
            )));
        }

        let mut term_counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut doc_freq: BTreeMap<String, usize> = BTreeMap::new();

        for doc in corpus {
            let terms = analyze(doc.as_ref(), params.ngram_range);
            let unique: BTreeSet<&String> = terms.iter().collect();
            for term in unique {
                *doc_freq.entry(term.clone()).or_default() += 1;
            }
            for term in terms {
                *term_counts.entry(term).or_default() += 1;
            }
        }

        if term_counts.is_empty() {
            return Err(SpamError::EmptyVocabulary);
        }

        let mut ranked: Vec<(String, usize)> = term_counts.into_iter().collect();
        // BTreeMap order plus a stable sort breaks count ties lexicographically.
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(params.max_features);

        let kept: BTreeSet<String> = ranked.into_iter().map(|(term, _)| term).collect();

        let n_docs = corpus.len() as f64;
        let mut vocabulary = BTreeMap::new();
        let mut idf = Vec::with_capacity(kept.len());
        for (idx, term) in kept.into_iter().enumerate() {
            let df = doc_freq.get(&term).copied().unwrap_or(0) as f64;
            idf.push(((1.0 + n_docs) / (1.0 + df)).ln() + 1.0);
            vocabulary.insert(term, idx as u32);
        }

        Ok(TfidfVectorizer {
            vocabulary,
            idf,
            ngram_range: params.ngram_range,
        })
    }

    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn index_of(&self, term: &str) -> Option<usize> {
        self.vocabulary.get(term).map(|&idx| idx as usize)
    }
}

impl Vectorizer for TfidfVectorizer {
    fn transform(&self, text: &str) -> FeatureVector {
        let mut counts: BTreeMap<u32, f64> = BTreeMap::new();
        for term in analyze(text, self.ngram_range) {
            if let Some(&idx) = self.vocabulary.get(&term) {
                *counts.entry(idx).or_default() += 1.0;
            }
        }

        let mut entries: Vec<(u32, f64)> = counts
            .into_iter()
            .map(|(idx, tf)| (idx, tf * self.idf[idx as usize]))
            .collect();

        let norm = entries.iter().map(|&(_, v)| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for (_, v) in &mut entries {
                *v /= norm;
            }
        }

        FeatureVector::new(self.dim(), entries)
    }

    fn dim(&self) -> usize {
        self.idf.len()
    }
}

/// Word n-grams of length `min_n..=max_n` over lowercase word tokens of two
/// or more characters.
fn analyze(text: &str, (min_n, max_n): (usize, usize)) -> Vec<String> {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = WORD_RE.find_iter(&lowered).map(|m| m.as_str()).collect();

    let mut terms = Vec::new();
    for n in min_n..=max_n {
        if n == 1 {
            terms.extend(words.iter().map(|w| w.to_string()));
        } else {
            terms.extend(words.windows(n).map(|w| w.join(" ")));
        }
    }
    terms
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(max_features: usize) -> TfidfParams {
        TfidfParams {
            max_features,
            ngram_range: (1, 2),
        }
    }

    #[test]
    fn analyzer_drops_short_tokens_and_splits_punctuation() {
        let terms = analyze("click URL_TOKEN a/b ok.", (1, 1));
        assert_eq!(terms, vec!["click", "url_token", "ok"]);
    }

    #[test]
    fn analyzer_emits_bigrams() {
        let terms = analyze("free prize now", (1, 2));
        assert_eq!(
            terms,
            vec!["free", "prize", "now", "free prize", "prize now"]
        );
    }

    #[test]
    fn vocabulary_is_capped_by_frequency() {
        let corpus = ["win win win cash", "win cash", "hello"];
        let vectorizer = TfidfVectorizer::fit(&corpus, &params(2)).unwrap();
        assert_eq!(vectorizer.vocabulary_len(), 2);
        assert!(vectorizer.index_of("win").is_some());
        assert!(vectorizer.index_of("cash").is_some());
        assert!(vectorizer.index_of("hello").is_none());
        // lexicographic indices
        assert_eq!(vectorizer.index_of("cash"), Some(0));
        assert_eq!(vectorizer.index_of("win"), Some(1));
    }

    #[test]
    fn transform_is_l2_normalized() {
        let corpus = ["free prize", "see tomorrow", "free cash"];
        let vectorizer = TfidfVectorizer::fit(&corpus, &params(100)).unwrap();
        let v = vectorizer.transform("free prize free");
        assert!((v.squared_norm() - 1.0).abs() < 1e-9);
        assert_eq!(v.dim(), vectorizer.dim());
    }

    #[test]
    fn rarer_terms_weigh_more() {
        let corpus = ["free prize", "free cash", "free lunch"];
        let vectorizer = TfidfVectorizer::fit(&corpus, &params(100)).unwrap();
        let v = vectorizer.transform("free prize");
        let free = v.get(vectorizer.index_of("free").unwrap());
        let prize = v.get(vectorizer.index_of("prize").unwrap());
        assert!(prize > free);
    }

    #[test]
    fn unseen_terms_contribute_nothing() {
        let corpus = ["free prize", "see tomorrow"];
        let vectorizer = TfidfVectorizer::fit(&corpus, &params(100)).unwrap();
        let before = vectorizer.clone();
        let v = vectorizer.transform("completely novel words");
        assert!(v.is_zero());
        assert_eq!(v.dim(), before.dim());
        assert_eq!(vectorizer, before);
    }

    #[test]
    fn empty_text_maps_to_zero_vector() {
        let corpus = ["free prize"];
        let vectorizer = TfidfVectorizer::fit(&corpus, &params(100)).unwrap();
        assert!(vectorizer.transform("").is_zero());
    }

    #[test]
    fn empty_corpus_vocabulary_is_an_error() {
        let corpus = ["", "a b c"];
        assert!(matches!(
            TfidfVectorizer::fit(&corpus, &params(100)),
            Err(SpamError::EmptyVocabulary)
        ));
    }

    #[test]
    fn feature_vector_lookup_and_dot() {
        let v = FeatureVector::new(4, vec![(3, 2.0), (1, 0.5), (2, 0.0)]);
        assert_eq!(v.nnz(), 2);
        assert_eq!(v.get(1), 0.5);
        assert_eq!(v.get(2), 0.0);
        assert_eq!(v.dot(&[1.0, 2.0, 3.0, 4.0]), 9.0);
    }
}
