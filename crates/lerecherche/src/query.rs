// Query normalization
//
// *La Question* (The Question) - Raw query text to each backend's full-text dialect

use crate::error::{Result, SearchError};
use lestockage::{Analyzer, LexicalDialect};
use once_cell::sync::Lazy;
use regex::Regex;

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").expect("non-word pattern is valid"));

/// Build a disjunctive `to_tsquery` expression
///
/// Every character that is neither a word character nor whitespace becomes a
/// space, so tsquery operators in user text never reach the parser. Input with
/// no surviving terms yields an empty string.
pub fn clean_tsquery(text: &str) -> String {
    let cleaned = NON_WORD.replace_all(text, " ");
    cleaned.split_whitespace().collect::<Vec<_>>().join(" | ")
}

/// Build an FTS5 `MATCH` expression
///
/// Each term is quoted as an FTS5 string (embedded `"` doubled) so punctuation
/// is literal, and terms are OR-ed together.
pub fn fts5_match_expression(text: &str) -> String {
    text.split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Turn raw query text into the backend's native lexical query
///
/// `analyzer` is `None` for pretokenized queries, which are used as given.
pub fn normalize(raw: &str, dialect: LexicalDialect, analyzer: Option<&dyn Analyzer>) -> String {
    let tokens = match analyzer {
        Some(analyzer) => analyzer.tokenize(raw),
        None => raw.split_whitespace().collect::<Vec<_>>().join(" "),
    };

    match dialect {
        LexicalDialect::Bm25Terms => tokens,
        LexicalDialect::Fts5 => fts5_match_expression(&tokens),
        LexicalDialect::TsQuery => clean_tsquery(&tokens),
    }
}

/// Check a query vector against the table's embedding width
pub fn check_dimension(vector: &[f64], expected: Option<usize>) -> Result<()> {
    match expected {
        Some(expected) if expected != vector.len() => Err(SearchError::DimensionMismatch {
            expected,
            got: vector.len(),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lestockage::EnglishAnalyzer;
    use rstest::rstest;

    #[rstest]
    #[case("covid-19 symptoms?", "covid | 19 | symptoms")]
    #[case("  a   b ", "a | b")]
    #[case("!!! ???", "")]
    #[case("", "")]
    #[case("rock & roll | !jazz", "rock | roll | jazz")]
    fn test_clean_tsquery(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(clean_tsquery(input), expected);
    }

    #[rstest]
    #[case("duck pond", "\"duck\" OR \"pond\"")]
    #[case("say \"hi\"", "\"say\" OR \"\"\"hi\"\"\"")]
    #[case("don't", "\"don't\"")]
    #[case("AND", "\"AND\"")]
    #[case("   ", "")]
    fn test_fts5_match_expression(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(fts5_match_expression(input), expected);
    }

    #[test]
    fn test_normalize_runs_analyzer_unless_pretokenized() {
        let analyzer = EnglishAnalyzer::new();
        assert_eq!(
            normalize("The Running Ducks", LexicalDialect::Bm25Terms, Some(&analyzer)),
            "run duck"
        );
        assert_eq!(
            normalize("The  Running Ducks", LexicalDialect::Bm25Terms, None),
            "The Running Ducks"
        );
    }

    #[test]
    fn test_normalize_per_dialect() {
        let analyzer = EnglishAnalyzer::new();
        assert_eq!(
            normalize("ducks ponds", LexicalDialect::Fts5, Some(&analyzer)),
            "\"duck\" OR \"pond\""
        );
        assert_eq!(
            normalize("ducks ponds", LexicalDialect::TsQuery, Some(&analyzer)),
            "duck | pond"
        );
    }

    #[test]
    fn test_pretokenized_text_is_stable() {
        let analyzer = EnglishAnalyzer::new();
        let tokenized = analyzer.tokenize("Ducks swimming in the ponds");
        assert_eq!(normalize(&tokenized, LexicalDialect::Bm25Terms, None), tokenized);
    }

    #[test]
    fn test_check_dimension() {
        assert!(check_dimension(&[1.0, 2.0], Some(2)).is_ok());
        assert!(check_dimension(&[1.0, 2.0], None).is_ok());
        assert!(matches!(
            check_dimension(&[1.0], Some(3)),
            Err(SearchError::DimensionMismatch { expected: 3, got: 1 })
        ));
    }
}
