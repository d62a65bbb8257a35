// Parquet input
//
// *Le Parquet* (The Parquet) - Columnar corpora read through DuckDB's `read_parquet`

use crate::records::{Document, RecordError};
use crate::table::quote_identifier;
use crate::vector::parse_vector_literal;
use duckdb::Connection;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::thread;
use tracing::debug;

/// Rows buffered between the scanning thread and the loader
const CHANNEL_DEPTH: usize = 1024;

const ID_COLUMNS: &[&str] = &["id", "docid", "_id", "qid"];
const CONTENTS_COLUMNS: &[&str] = &["contents", "text"];
const VECTOR_COLUMNS: &[&str] = &["vector", "embedding"];

/// Which Parquet columns feed a [`Document`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParquetColumns {
    /// Identifier column
    pub id: String,
    /// Text column, if any
    pub contents: Option<String>,
    /// Embedding column, if any
    pub vector: Option<String>,
}

fn find_column(columns: &[(String, String)], names: &[&str]) -> Option<String> {
    columns
        .iter()
        .find(|(name, _)| names.contains(&name.to_ascii_lowercase().as_str()))
        .map(|(name, _)| name.clone())
}

impl ParquetColumns {
    /// Pick columns from `(name, type)` pairs
    ///
    /// Known names win. Without one, the first column is the id and the first
    /// other list-typed column is the vector. `None` for a schema with no columns.
    pub fn resolve(columns: &[(String, String)]) -> Option<Self> {
        let (first, _) = columns.first()?;
        let id = find_column(columns, ID_COLUMNS).unwrap_or_else(|| first.clone());
        let contents = find_column(columns, CONTENTS_COLUMNS);
        let vector = find_column(columns, VECTOR_COLUMNS).or_else(|| {
            columns
                .iter()
                .filter(|(name, _)| *name != id)
                .find(|(_, column_type)| column_type.trim_end().ends_with(']'))
                .map(|(name, _)| name.clone())
        });
        Some(Self { id, contents, vector })
    }

    /// Projection yielding id, contents and a vector literal, all as text
    pub fn select_list(&self) -> String {
        let contents = match &self.contents {
            Some(column) => format!("CAST({} AS VARCHAR)", quote_identifier(column)),
            None => "NULL".to_string(),
        };
        let vector = match &self.vector {
            Some(column) => format!("CAST(TRY_CAST({} AS DOUBLE[]) AS VARCHAR)", quote_identifier(column)),
            None => "NULL".to_string(),
        };
        format!(
            "CAST({} AS VARCHAR), {}, {}",
            quote_identifier(&self.id),
            contents,
            vector
        )
    }
}

/// Render `path` as an SQL string literal
pub fn path_literal(path: &Path) -> String {
    format!("'{}'", path.to_string_lossy().replace('\'', "''"))
}

/// Column names and types of a Parquet file
pub fn describe_parquet(conn: &Connection, path: &Path) -> duckdb::Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare(&format!(
        "DESCRIBE SELECT * FROM read_parquet({})",
        path_literal(path)
    ))?;
    let columns = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<duckdb::Result<Vec<_>>>()?;
    Ok(columns)
}

fn parquet_error(path: &Path, source: duckdb::Error) -> RecordError {
    RecordError::Parquet {
        path: path.to_path_buf(),
        source,
    }
}

/// Streaming reader over one Parquet file
///
/// A background thread owns a private in-memory DuckDB connection and feeds
/// rows through a bounded channel, so memory stays flat on large files.
pub struct ParquetReader {
    path: PathBuf,
    columns: ParquetColumns,
    rows: Receiver<Result<Document, RecordError>>,
}

impl ParquetReader {
    /// Resolve the file's columns and start scanning
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RecordError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open_in_memory().map_err(|e| parquet_error(&path, e))?;
        let described = describe_parquet(&conn, &path).map_err(|e| parquet_error(&path, e))?;
        let columns = ParquetColumns::resolve(&described)
            .ok_or_else(|| RecordError::UnsupportedFormat { path: path.clone() })?;
        debug!("Reading {:?} with columns {:?}", path, columns);

        let (tx, rx) = sync_channel(CHANNEL_DEPTH);
        let worker_path = path.clone();
        let worker_columns = columns.clone();
        thread::spawn(move || {
            if let Err(source) = send_rows(&worker_path, &worker_columns, &tx) {
                let _ = tx.send(Err(parquet_error(&worker_path, source)));
            }
        });

        Ok(Self {
            path,
            columns,
            rows: rx,
        })
    }

    /// File being read
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Columns in use
    pub fn columns(&self) -> &ParquetColumns {
        &self.columns
    }
}

impl Iterator for ParquetReader {
    type Item = Result<Document, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows.recv().ok()
    }
}

fn send_rows(
    path: &Path,
    columns: &ParquetColumns,
    tx: &SyncSender<Result<Document, RecordError>>,
) -> duckdb::Result<()> {
    let conn = Connection::open_in_memory()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM read_parquet({})",
        columns.select_list(),
        path_literal(path)
    ))?;
    let mut rows = stmt.query([])?;

    let mut row_no = 0;
    while let Some(row) = rows.next()? {
        row_no += 1;
        let id: Option<String> = row.get(0)?;
        let contents: Option<String> = row.get(1)?;
        let literal: Option<String> = row.get(2)?;

        let record = match id.filter(|id| !id.is_empty()) {
            None => Err(RecordError::MissingId {
                path: path.to_path_buf(),
                line: row_no,
            }),
            Some(id) => match literal {
                None => Ok(Document {
                    id,
                    contents,
                    vector: None,
                }),
                Some(literal) => match parse_vector_literal(&literal) {
                    Some(vector) => Ok(Document {
                        id,
                        contents,
                        vector: Some(vector),
                    }),
                    None => Err(RecordError::MalformedVector {
                        path: path.to_path_buf(),
                        line: row_no,
                    }),
                },
            },
        };

        // The reader was dropped
        if tx.send(record).is_err() {
            return Ok(());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    fn columns(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(n, t)| (n.to_string(), t.to_string()))
            .collect()
    }

    /// Helper: write the rows of `select` to a Parquet file
    fn write_parquet(dir: &TempDir, name: &str, select: &str) -> PathBuf {
        let path = dir.path().join(name);
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(&format!(
            "COPY ({}) TO {} (FORMAT PARQUET)",
            select,
            path_literal(&path)
        ))
        .unwrap();
        path
    }

    #[rstest]
    #[case(&[("docid", "VARCHAR"), ("text", "VARCHAR")], "docid", Some("text"), None)]
    #[case(&[("key", "BIGINT"), ("emb", "FLOAT[4]")], "key", None, Some("emb"))]
    #[case(&[("id", "VARCHAR"), ("embedding", "DOUBLE[]"), ("contents", "VARCHAR")], "id", Some("contents"), Some("embedding"))]
    #[case(&[("pid", "VARCHAR"), ("body", "VARCHAR")], "pid", None, None)]
    fn test_resolve_columns(
        #[case] schema: &[(&str, &str)],
        #[case] id: &str,
        #[case] contents: Option<&str>,
        #[case] vector: Option<&str>,
    ) {
        let resolved = ParquetColumns::resolve(&columns(schema)).unwrap();
        assert_eq!(resolved.id, id);
        assert_eq!(resolved.contents.as_deref(), contents);
        assert_eq!(resolved.vector.as_deref(), vector);
    }

    #[test]
    fn test_resolve_empty_schema() {
        assert!(ParquetColumns::resolve(&[]).is_none());
    }

    #[test]
    fn test_path_literal_escapes_quotes() {
        assert_eq!(path_literal(Path::new("/tmp/o'brien.parquet")), "'/tmp/o''brien.parquet'");
    }

    #[test]
    fn test_reader_streams_documents() {
        let dir = TempDir::new().unwrap();
        let path = write_parquet(
            &dir,
            "corpus.parquet",
            "SELECT * FROM (VALUES
                (1, 'ducks swim', [1.0, 0.0]::FLOAT[]),
                (NULL, 'orphan', [0.0, 1.0]::FLOAT[]),
                (3, 'geese walk', NULL)
             ) t(id, contents, vector)",
        );

        let reader = ParquetReader::open(&path).unwrap();
        assert_eq!(reader.columns().vector.as_deref(), Some("vector"));

        let results: Vec<_> = reader.collect();
        assert_eq!(results.len(), 3);

        let first = results[0].as_ref().unwrap();
        assert_eq!(first.id, "1");
        assert_eq!(first.contents.as_deref(), Some("ducks swim"));
        assert_eq!(first.vector, Some(vec![1.0, 0.0]));

        assert!(matches!(results[1], Err(RecordError::MissingId { line: 2, .. })));

        let third = results[2].as_ref().unwrap();
        assert_eq!(third.id, "3");
        assert!(third.vector.is_none());
    }

    #[test]
    fn test_unreadable_parquet_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.parquet");
        std::fs::write(&path, "not parquet").unwrap();

        let err = ParquetReader::open(&path).err().unwrap();
        assert!(matches!(err, RecordError::Parquet { .. }));
        assert!(err.is_fatal());
    }
}
