// Text analysis
//
// *L'Analyse* (The Analysis) - Text to whitespace-joined token strings

use once_cell::sync::Lazy;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

/// Turns raw text into index terms
///
/// Loading and querying share one analyzer so stored contents and lexical
/// queries agree on their vocabulary.
pub trait Analyzer: Send + Sync {
    /// Split text into terms
    fn analyze(&self, text: &str) -> Vec<String>;

    /// Analyze and join the terms with single spaces
    fn tokenize(&self, text: &str) -> String {
        self.analyze(text).join(" ")
    }
}

/// English stop words, matching the classic Lucene English stop set
pub const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

static TOKEN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\p{L}\p{N}]+(?:['’][\p{L}\p{N}]+)*").expect("token pattern is valid")
});

/// Default English analyzer
///
/// NFKC normalization, lowercasing, Unicode word tokenization, possessive
/// stripping, stop word removal, and Snowball English stemming.
pub struct EnglishAnalyzer {
    stemmer: Stemmer,
    stop_words: HashSet<&'static str>,
}

impl EnglishAnalyzer {
    /// Create an analyzer with the English stop set
    pub fn new() -> Self {
        Self {
            stemmer: Stemmer::create(Algorithm::English),
            stop_words: ENGLISH_STOP_WORDS.iter().copied().collect(),
        }
    }

    /// Create an analyzer that keeps stop words
    pub fn without_stop_words() -> Self {
        Self {
            stemmer: Stemmer::create(Algorithm::English),
            stop_words: HashSet::new(),
        }
    }

    fn strip_possessive(token: &str) -> &str {
        token
            .strip_suffix("'s")
            .or_else(|| token.strip_suffix("’s"))
            .unwrap_or(token)
    }
}

impl Default for EnglishAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer for EnglishAnalyzer {
    fn analyze(&self, text: &str) -> Vec<String> {
        let normalized: String = text.nfkc().collect::<String>().to_lowercase();

        TOKEN_PATTERN
            .find_iter(&normalized)
            .map(|m| Self::strip_possessive(m.as_str()))
            .filter(|token| !token.is_empty() && !self.stop_words.contains(token))
            .map(|token| {
                // Inner apostrophes ("don't") are kept out of the stored term
                let token: String = token.chars().filter(|c| *c != '\'' && *c != '’').collect();
                self.stemmer.stem(&token).into_owned()
            })
            .filter(|token| !token.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercases_and_drops_stop_words() {
        let analyzer = EnglishAnalyzer::new();
        assert_eq!(analyzer.tokenize("The Duck and THE Pond"), "duck pond");
    }

    #[test]
    fn test_stems_and_strips_possessives() {
        let analyzer = EnglishAnalyzer::new();
        let terms = analyzer.analyze("the duck's running ponds");
        assert_eq!(terms, vec!["duck", "run", "pond"]);
    }

    #[test]
    fn test_punctuation_is_a_separator() {
        let analyzer = EnglishAnalyzer::new();
        assert_eq!(analyzer.tokenize("covid-19: (symptoms)?"), "covid 19 symptom");
    }

    #[test]
    fn test_empty_and_stop_only_text() {
        let analyzer = EnglishAnalyzer::new();
        assert_eq!(analyzer.tokenize(""), "");
        assert_eq!(analyzer.tokenize("the and of"), "");
    }

    #[test]
    fn test_without_stop_words_keeps_them() {
        let analyzer = EnglishAnalyzer::without_stop_words();
        assert_eq!(analyzer.tokenize("the pond"), "the pond");
    }

    #[test]
    fn test_fullwidth_text_is_normalized() {
        let analyzer = EnglishAnalyzer::new();
        assert_eq!(analyzer.tokenize("ＤＵＣＫ"), "duck");
    }
}
