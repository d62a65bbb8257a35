// Run files
//
// *Le Classement* (The Ranking) - Per-query results to TREC run lines in natural query order

use crate::dispatch::SearchMode;
use lestockage::{Backend, SearchResult};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{info, warn};

/// One line of a TREC run file
#[derive(Debug, Clone, PartialEq)]
pub struct RunLine {
    /// Query identifier
    pub query_id: String,
    /// Retrieved document
    pub doc_id: String,
    /// 1-based rank within the query
    pub rank: usize,
    /// Score the rank was assigned from
    pub score: f64,
    /// Run label
    pub run_tag: String,
}

impl fmt::Display for RunLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Scores always carry a decimal point or exponent: 1.0, 1e-5
        write!(
            f,
            "{} Q0 {} {} {:?} {}",
            self.query_id, self.doc_id, self.rank, self.score, self.run_tag
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum KeyPart {
    Text(String),
    // Digits with leading zeros stripped, then the digits as written
    Number(String, String),
}

impl Ord for KeyPart {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyPart::Text(a), KeyPart::Text(b)) => a.cmp(b),
            (KeyPart::Number(a, raw_a), KeyPart::Number(b, raw_b)) => a
                .len()
                .cmp(&b.len())
                .then_with(|| a.cmp(b))
                .then_with(|| raw_a.cmp(raw_b)),
            (KeyPart::Text(_), KeyPart::Number(..)) => Ordering::Less,
            (KeyPart::Number(..), KeyPart::Text(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for KeyPart {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Sort key that compares digit runs by numeric value
///
/// `"q9" < "q10"`, and numbers of any length compare without overflow.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct NaturalKey(Vec<KeyPart>);

/// Split `id` into alternating text and digit runs
pub fn natural_key(id: &str) -> NaturalKey {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_digits = false;

    // Keep text and digit runs at the same positions for every id
    if id.starts_with(|c: char| c.is_ascii_digit()) {
        parts.push(KeyPart::Text(String::new()));
    }

    for c in id.chars() {
        let is_digit = c.is_ascii_digit();
        if !current.is_empty() && is_digit != in_digits {
            parts.push(finish_part(std::mem::take(&mut current), in_digits));
        }
        in_digits = is_digit;
        current.push(c);
    }
    if !current.is_empty() {
        parts.push(finish_part(current, in_digits));
    }
    NaturalKey(parts)
}

fn finish_part(run: String, digits: bool) -> KeyPart {
    if digits {
        let stripped = run.trim_start_matches('0').to_string();
        KeyPart::Number(stripped, run)
    } else {
        KeyPart::Text(run)
    }
}

/// Flatten per-query rankings into sorted run lines
///
/// Ranks follow the order of each query's results. Lines are ordered by
/// `(natural_key(query_id), rank)`. A query id seen twice keeps its first
/// block.
pub fn finalize<I>(per_query: I, run_tag: &str) -> Vec<RunLine>
where
    I: IntoIterator<Item = (String, Vec<SearchResult>)>,
{
    let mut seen = HashSet::new();
    let mut lines = Vec::new();

    for (query_id, results) in per_query {
        if !seen.insert(query_id.clone()) {
            warn!("Dropping repeated results for query {}", query_id);
            continue;
        }
        lines.extend(results.into_iter().enumerate().map(|(i, result)| RunLine {
            query_id: query_id.clone(),
            doc_id: result.doc_id,
            rank: i + 1,
            score: result.score,
            run_tag: run_tag.to_string(),
        }));
    }

    lines.sort_by_cached_key(|line| (natural_key(&line.query_id), line.rank));
    lines
}

/// Write run lines to `path`, replacing any existing file
///
/// Lines go to a temporary file beside the target which is then renamed over
/// it, so readers never observe a partial run.
pub fn write_run_file(path: impl AsRef<Path>, lines: &[RunLine]) -> io::Result<()> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(file.as_file_mut());
        for line in lines {
            writeln!(writer, "{}", line)?;
        }
        writer.flush()?;
    }
    file.persist(path).map_err(|e| e.error)?;

    info!("Wrote {} run lines to {}", lines.len(), path.display());
    Ok(())
}

/// Run tag used when none is given, e.g. `hybrid_duckdb`
pub fn default_run_tag(mode: SearchMode, backend: Backend) -> String {
    format!("{}_{}", mode, backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[test]
    fn test_run_line_format() {
        let line = RunLine {
            query_id: "q1".to_string(),
            doc_id: "d7".to_string(),
            rank: 3,
            score: 0.5,
            run_tag: "sparse_duckdb".to_string(),
        };
        assert_eq!(line.to_string(), "q1 Q0 d7 3 0.5 sparse_duckdb");
    }

    #[rstest]
    #[case(1.0, "q1 Q0 d 1 1.0 t")]
    #[case(0.00001, "q1 Q0 d 1 1e-5 t")]
    #[case(12.75, "q1 Q0 d 1 12.75 t")]
    fn test_run_line_score_keeps_float_form(#[case] score: f64, #[case] expected: &str) {
        let line = RunLine {
            query_id: "q1".to_string(),
            doc_id: "d".to_string(),
            rank: 1,
            score,
            run_tag: "t".to_string(),
        };
        assert_eq!(line.to_string(), expected);
    }

    #[rstest]
    #[case("q9", "q10")]
    #[case("q2", "q10")]
    #[case("a", "b")]
    #[case("doc2x", "doc10a")]
    #[case("7", "12")]
    #[case("007", "7")]
    #[case("7", "q7")]
    #[case("99999999999999999999999", "100000000000000000000000")]
    fn test_natural_key_orders(#[case] lower: &str, #[case] higher: &str) {
        assert!(natural_key(lower) < natural_key(higher), "{} < {}", lower, higher);
    }

    #[test]
    fn test_natural_key_splits_runs() {
        assert_eq!(
            natural_key("q10b2"),
            NaturalKey(vec![
                KeyPart::Text("q".to_string()),
                KeyPart::Number("10".to_string(), "10".to_string()),
                KeyPart::Text("b".to_string()),
                KeyPart::Number("2".to_string(), "2".to_string()),
            ])
        );
        assert_eq!(natural_key(""), NaturalKey(vec![]));
    }

    #[test]
    fn test_finalize_sorts_queries_naturally() {
        let per_query = ["q1", "q9", "q10", "q2"]
            .iter()
            .map(|q| (q.to_string(), vec![SearchResult::new("d", 1.0)]))
            .collect::<Vec<_>>();
        let lines = finalize(per_query, "tag");
        let order: Vec<_> = lines.iter().map(|l| l.query_id.as_str()).collect();
        assert_eq!(order, vec!["q1", "q2", "q9", "q10"]);
    }

    #[test]
    fn test_finalize_assigns_contiguous_ranks() {
        let lines = finalize(
            vec![(
                "q1".to_string(),
                vec![
                    SearchResult::new("a", 3.0),
                    SearchResult::new("b", 2.0),
                    SearchResult::new("c", 2.0),
                ],
            )],
            "tag",
        );
        let ranks: Vec<_> = lines.iter().map(|l| l.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[test]
    fn test_finalize_keeps_first_duplicate_block() {
        let lines = finalize(
            vec![
                ("q1".to_string(), vec![SearchResult::new("first", 1.0)]),
                ("q1".to_string(), vec![SearchResult::new("second", 1.0)]),
            ],
            "tag",
        );
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].doc_id, "first");
    }

    #[test]
    fn test_write_run_file_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.txt");
        std::fs::write(&path, "stale\nstale\nstale\n").unwrap();

        let lines = finalize(
            vec![("q1".to_string(), vec![SearchResult::new("d1", 2.5)])],
            "dense_sqlite",
        );
        write_run_file(&path, &lines).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "q1 Q0 d1 1 2.5 dense_sqlite\n");
    }

    #[test]
    fn test_default_run_tag() {
        assert_eq!(default_run_tag(SearchMode::Hybrid, Backend::DuckDb), "hybrid_duckdb");
    }
}
