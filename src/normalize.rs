//! Canonical form of exercise names for fuzzy comparison.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Spanish filler words dropped before comparing exercise names.
pub const DEFAULT_STOPWORDS: [&str; 9] = ["en", "al", "el", "la", "los", "las", "de", "del", "con"];

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Name normalizer with a configurable stopword list.
#[derive(Debug, Clone)]
pub struct Normalizer {
    stopwords: Option<Regex>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(&DEFAULT_STOPWORDS)
    }
}

impl Normalizer {
    /// Build a normalizer that removes the given whole words.
    ///
    /// Stopwords are folded the same way as the input (lower case, no
    /// diacritics) so `"Del"` and `"del"` are equivalent. Entries that fold to
    /// nothing are ignored.
    pub fn new<S: AsRef<str>>(stopwords: &[S]) -> Self {
        let words: Vec<String> = stopwords
            .iter()
            .map(|w| fold(w.as_ref()).trim().to_owned())
            .filter(|w| !w.is_empty())
            .map(|w| regex::escape(&w))
            .collect();
        let stopwords = if words.is_empty() {
            None
        } else {
            // Escaped literals joined by `|` always form a valid pattern.
            Regex::new(&format!(r"\b(?:{})\b", words.join("|"))).ok()
        };
        Normalizer { stopwords }
    }

    /// Canonicalize `name`: lower case, strip diacritics, drop stopwords,
    /// collapse whitespace and trim.
    ///
    /// `normalize(normalize(x)) == normalize(x)` for every input.
    pub fn normalize(&self, name: &str) -> String {
        let folded = fold(name);
        let without_stopwords = match &self.stopwords {
            Some(re) => re.replace_all(&folded, " ").into_owned(),
            None => folded,
        };
        WHITESPACE
            .replace_all(&without_stopwords, " ")
            .trim()
            .to_owned()
    }
}

fn fold(text: &str) -> String {
    text.to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect()
}
