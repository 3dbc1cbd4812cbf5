//! Canonical text form shared by training and inference.
//!
//! The same [`Normalizer`] must run on both sides so that the vectorizer sees
//! identical token streams. Normalization never fails: missing or garbage
//! input degrades to an empty string.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use stop_words::LANGUAGE;

/// Sentinel that replaces every URL-like substring.
pub const URL_TOKEN: &str = "URL_TOKEN";

/// Obfuscated spellings rewritten before URL detection, applied in order.
const DEOBFUSCATIONS: [(&str, &str); 2] = [("hxxp", "http"), ("vvv", "www")];

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(hxxp|http|vvv|www)\S*").expect("URL pattern is valid"));

static ENGLISH: LazyLock<Normalizer> = LazyLock::new(Normalizer::default);

#[derive(Debug, Clone)]
pub struct Normalizer {
    stopwords: HashSet<String>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Normalizer::with_stopwords(stop_words::get(LANGUAGE::English).iter())
    }
}

impl Normalizer {
    pub fn with_stopwords<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        Normalizer {
            stopwords: words.into_iter().map(|w| w.to_string()).collect(),
        }
    }

    /// Process-wide English normalizer; the stop-word set is built on first use
    /// and never changes afterwards.
    pub fn english() -> &'static Normalizer {
        &ENGLISH
    }

    pub fn is_stopword(&self, token: &str) -> bool {
        self.stopwords.contains(token)
    }

    pub fn normalize(&self, raw: Option<&str>) -> String {
        let Some(raw) = raw else {
            return String::new();
        };

        let mut text = raw.to_lowercase();
        for (from, to) in DEOBFUSCATIONS {
            text = text.replace(from, to);
        }

        let filtered: String = text
            .chars()
            .map(|c| if is_kept_char(c) { c } else { ' ' })
            .collect();

        let collapsed = URL_RE.replace_all(&filtered, " URL_TOKEN ");

        collapsed
            .split_whitespace()
            .filter(|token| !self.is_stopword(token))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn is_kept_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() || matches!(c, ':' | '/' | '.')
}

/// Normalizes with the shared English stop-word set.
pub fn normalize(raw: Option<&str>) -> String {
    Normalizer::english().normalize(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_input_is_empty() {
        assert_eq!(normalize(None), "");
        assert_eq!(normalize(Some("")), "");
    }

    #[test]
    fn punctuation_becomes_whitespace() {
        let custom = Normalizer::with_stopwords(Vec::<String>::new());
        assert_eq!(custom.normalize(Some("Win!!! $$$ cash, now?")), "win cash now");
    }

    #[test]
    fn keeps_url_punctuation_before_collapse() {
        let custom = Normalizer::with_stopwords(Vec::<String>::new());
        assert_eq!(custom.normalize(Some("ratio 3:2 a/b v1.2")), "ratio 3:2 a/b v1.2");
    }

    #[test]
    fn deobfuscated_links_collapse() {
        assert_eq!(normalize(Some("go to vvv.prizes.example")), "go URL_TOKEN");
        let custom = Normalizer::with_stopwords(Vec::<String>::new());
        assert_eq!(
            custom.normalize(Some("HXXPS://evil.example/claim now")),
            "URL_TOKEN now"
        );
    }

    #[test]
    fn url_inside_token_collapses_from_scheme() {
        let custom = Normalizer::with_stopwords(Vec::<String>::new());
        assert_eq!(custom.normalize(Some("visit:http://x.example")), "visit: URL_TOKEN");
    }

    #[test]
    fn sentinel_survives_stopword_filter() {
        let only_sentinel = Normalizer::with_stopwords(["url_token"]);
        assert_eq!(only_sentinel.normalize(Some("http://a.b")), URL_TOKEN);
    }

    #[test]
    fn non_ascii_letters_are_dropped() {
        let custom = Normalizer::with_stopwords(Vec::<String>::new());
        assert_eq!(custom.normalize(Some("café olé")), "caf ol");
    }

    #[test]
    fn all_stopwords_yield_empty() {
        assert_eq!(normalize(Some("and the of to you")), "");
        assert_eq!(normalize(Some("?!, ;* ()")), "");
    }
}
