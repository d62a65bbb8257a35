// Vector literals
//
// Embeddings cross the SQL boundary as `[x, y, z]` text, which both DuckDB
// arrays and pgvector accept in casts and produce when cast back to text.

use once_cell::sync::Lazy;
use regex::Regex;

static DIMENSION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\[|\()\s*(\d+)\s*(?:\]|\))\s*$").expect("dimension pattern is valid"));

/// Render a vector as `[x, y, z]`
pub fn format_vector_literal(vector: &[f64]) -> String {
    let mut literal = String::with_capacity(vector.len() * 12 + 2);
    literal.push('[');
    for (i, value) in vector.iter().enumerate() {
        if i > 0 {
            literal.push_str(", ");
        }
        literal.push_str(&value.to_string());
    }
    literal.push(']');
    literal
}

/// Parse `[x, y, z]` (brackets optional) back into a vector
pub fn parse_vector_literal(literal: &str) -> Option<Vec<f64>> {
    let inner = literal
        .trim()
        .trim_start_matches(['[', '{'])
        .trim_end_matches([']', '}'])
        .trim();
    if inner.is_empty() {
        return Some(Vec::new());
    }
    inner
        .split(',')
        .map(|part| part.trim().parse::<f64>().ok())
        .collect()
}

/// Extract the width from a column type such as `DOUBLE[768]` or `vector(768)`
pub fn parse_dimension(column_type: &str) -> Option<usize> {
    DIMENSION_PATTERN
        .captures(column_type)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Whether every component is finite
pub fn is_finite(vector: &[f64]) -> bool {
    vector.iter().all(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_round_trip() {
        let vector = vec![0.25, -1.0, 3.0e-7, 12.5];
        let literal = format_vector_literal(&vector);
        assert_eq!(parse_vector_literal(&literal), Some(vector));
    }

    #[test]
    fn test_parse_backend_renderings() {
        assert_eq!(parse_vector_literal("[1,2,3]"), Some(vec![1.0, 2.0, 3.0]));
        assert_eq!(parse_vector_literal("[1.0, 2.0]"), Some(vec![1.0, 2.0]));
        assert_eq!(parse_vector_literal("[]"), Some(vec![]));
        assert_eq!(parse_vector_literal("[1, duck]"), None);
    }

    #[test]
    fn test_parse_dimension() {
        assert_eq!(parse_dimension("DOUBLE[768]"), Some(768));
        assert_eq!(parse_dimension("FLOAT[3]"), Some(3));
        assert_eq!(parse_dimension("vector(1024)"), Some(1024));
        assert_eq!(parse_dimension("DOUBLE[]"), None);
        assert_eq!(parse_dimension("VARCHAR"), None);
    }

    #[test]
    fn test_is_finite() {
        assert!(is_finite(&[0.0, 1.0]));
        assert!(!is_finite(&[f64::NAN]));
    }
}
