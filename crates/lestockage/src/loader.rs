// Bulk loading
//
// *Le Chargement* (The Loading) - Streams records into a store in bounded batches

use crate::analysis::Analyzer;
use crate::records::{read_records, Document, RecordError, RecordFormat};
use crate::store::{Store, StoreError};
use crate::table::{TableName, TableShape};
use crate::vector::is_finite;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Rows buffered before each insert
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Options for [`bulk_load`]
pub struct LoadOptions<'a> {
    /// Shape of the target table
    pub shape: TableShape,

    /// Store `contents` verbatim instead of analyzing it
    pub pretokenized: bool,

    /// Expected embedding width; the first vector seen fixes it when unset
    pub embedding_dim: Option<usize>,

    /// Rows per insert batch
    pub batch_size: usize,

    /// Analyzer applied to `contents` unless pretokenized
    pub analyzer: &'a dyn Analyzer,
}

impl<'a> LoadOptions<'a> {
    /// Options with the default batch size
    pub fn new(shape: TableShape, analyzer: &'a dyn Analyzer) -> Self {
        Self {
            shape,
            pretokenized: false,
            embedding_dim: None,
            batch_size: DEFAULT_BATCH_SIZE,
            analyzer,
        }
    }

    /// Mark the input as already tokenized
    #[must_use]
    pub fn pretokenized(mut self, pretokenized: bool) -> Self {
        self.pretokenized = pretokenized;
        self
    }

    /// Fix the embedding width
    #[must_use]
    pub fn with_embedding_dim(mut self, dim: Option<usize>) -> Self {
        self.embedding_dim = dim;
        self
    }

    /// Override the batch size (minimum 1)
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

/// Outcome of a load
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Rows written
    pub loaded: usize,

    /// Records skipped with a warning
    pub skipped: usize,

    /// Embedding width in force at the end of the load
    pub embedding_dim: Option<usize>,
}

/// Errors that stop a load
#[derive(Debug, Error)]
pub enum LoadError {
    /// The store rejected a batch
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The input became unreadable
    #[error(transparent)]
    Record(#[from] RecordError),
}

/// Why a record was left out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Lexical shape without `contents`
    MissingContents,
    /// Vector shape without `vector`
    MissingVector,
    /// Width differs from the table's
    DimensionMismatch {
        /// Table width
        expected: usize,
        /// Record width
        got: usize,
    },
    /// NaN or infinite component
    NonFiniteVector,
    /// Id already loaded
    DuplicateId,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingContents => write!(f, "no contents for a lexical table"),
            SkipReason::MissingVector => write!(f, "no vector for a vector table"),
            SkipReason::DimensionMismatch { expected, got } => {
                write!(f, "vector has {} dimensions, table has {}", got, expected)
            }
            SkipReason::NonFiniteVector => write!(f, "vector has non-finite components"),
            SkipReason::DuplicateId => write!(f, "duplicate id"),
        }
    }
}

/// Shape a record for the target table
///
/// Columns the table lacks are dropped; `contents` is analyzed unless the
/// input is pretokenized. `embedding_dim` is fixed by the first vector when unset.
pub fn prepare_document(
    doc: Document,
    options: &LoadOptions<'_>,
    embedding_dim: &mut Option<usize>,
) -> Result<Document, SkipReason> {
    let contents = if options.shape.has_lexical() {
        let contents = doc.contents.ok_or(SkipReason::MissingContents)?;
        Some(if options.pretokenized {
            contents
        } else {
            options.analyzer.tokenize(&contents)
        })
    } else {
        None
    };

    let vector = if options.shape.has_vector() {
        let vector = doc.vector.ok_or(SkipReason::MissingVector)?;
        if !is_finite(&vector) {
            return Err(SkipReason::NonFiniteVector);
        }
        match *embedding_dim {
            Some(expected) if expected != vector.len() => {
                return Err(SkipReason::DimensionMismatch {
                    expected,
                    got: vector.len(),
                });
            }
            Some(_) => {}
            None => *embedding_dim = Some(vector.len()),
        }
        Some(vector)
    } else {
        None
    };

    Ok(Document {
        id: doc.id,
        contents,
        vector,
    })
}

/// Stream `records` into `table`
///
/// Malformed, duplicate, and mis-shaped records are skipped with one warning
/// each. Only an unreadable input or a store failure stops the load.
pub fn bulk_load<S, I>(
    store: &mut S,
    table: &TableName,
    records: I,
    options: &LoadOptions<'_>,
) -> Result<LoadStats, LoadError>
where
    S: Store + ?Sized,
    I: IntoIterator<Item = Result<Document, RecordError>>,
{
    let mut stats = LoadStats::default();
    let mut embedding_dim = options.embedding_dim;
    let mut seen: HashSet<String> = HashSet::new();
    let mut batch: Vec<Document> = Vec::with_capacity(options.batch_size.min(DEFAULT_BATCH_SIZE));

    for record in records {
        let doc = match record {
            Ok(doc) => doc,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                warn!("Skipping record: {}", e);
                stats.skipped += 1;
                continue;
            }
        };

        if seen.contains(&doc.id) {
            warn!("Skipping record {} in {}: {}", doc.id, table, SkipReason::DuplicateId);
            stats.skipped += 1;
            continue;
        }

        let id = doc.id.clone();
        match prepare_document(doc, options, &mut embedding_dim) {
            Ok(doc) => {
                seen.insert(id);
                batch.push(doc);
            }
            Err(reason) => {
                warn!("Skipping record {} in {}: {}", id, table, reason);
                stats.skipped += 1;
                continue;
            }
        }

        if batch.len() >= options.batch_size {
            stats.loaded += store.insert_batch(table, options.shape, &batch)?;
            debug!("Inserted {} rows into {}", stats.loaded, table);
            batch.clear();
        }
    }

    if !batch.is_empty() {
        stats.loaded += store.insert_batch(table, options.shape, &batch)?;
    }

    stats.embedding_dim = embedding_dim;
    info!(
        "Loaded {} rows into {} ({} skipped)",
        stats.loaded, table, stats.skipped
    );
    Ok(stats)
}

/// Load a file or directory into `table`
///
/// A single Parquet file bound for a vector table goes through the store's
/// native import when the width is known and the store has one. Everything
/// else streams through [`bulk_load`].
pub fn load_path<S>(
    store: &mut S,
    table: &TableName,
    path: impl AsRef<Path>,
    options: &LoadOptions<'_>,
) -> Result<LoadStats, LoadError>
where
    S: Store + ?Sized,
{
    let path = path.as_ref();
    let parquet_file = path.is_file() && RecordFormat::detect(path) == Some(RecordFormat::Parquet);

    if let (TableShape::Vector, true, Some(dim)) = (options.shape, parquet_file, options.embedding_dim) {
        if let Some(imported) = store.import_parquet(table, path, dim)? {
            return Ok(LoadStats {
                loaded: imported.loaded,
                skipped: imported.skipped,
                embedding_dim: Some(dim),
            });
        }
        debug!("No native Parquet import for {}, streaming {:?}", table, path);
    }

    bulk_load(store, table, read_records(path)?, options)
}

/// Width of the first vector found under `path`
///
/// Unreadable records are passed over, as the load itself would skip them.
pub fn infer_dimension(path: impl AsRef<Path>) -> Result<Option<usize>, RecordError> {
    for record in read_records(path)? {
        match record {
            Ok(Document {
                vector: Some(vector),
                ..
            }) => return Ok(Some(vector.len())),
            Ok(_) => continue,
            Err(e) if e.is_fatal() => return Err(e),
            Err(_) => continue,
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::EnglishAnalyzer;

    #[test]
    fn test_prepare_tokenizes_unless_pretokenized() {
        let analyzer = EnglishAnalyzer::new();
        let mut dim = None;

        let options = LoadOptions::new(TableShape::Lexical, &analyzer);
        let doc = prepare_document(Document::text("d1", "The Ducks"), &options, &mut dim).unwrap();
        assert_eq!(doc.contents.as_deref(), Some("duck"));

        let options = LoadOptions::new(TableShape::Lexical, &analyzer).pretokenized(true);
        let doc = prepare_document(Document::text("d1", "The Ducks"), &options, &mut dim).unwrap();
        assert_eq!(doc.contents.as_deref(), Some("The Ducks"));
    }

    #[test]
    fn test_prepare_fixes_dimension_from_first_vector() {
        let analyzer = EnglishAnalyzer::new();
        let options = LoadOptions::new(TableShape::Vector, &analyzer);
        let mut dim = None;

        prepare_document(Document::embedding("a", vec![1.0, 0.0]), &options, &mut dim).unwrap();
        assert_eq!(dim, Some(2));

        let err = prepare_document(Document::embedding("b", vec![1.0]), &options, &mut dim).unwrap_err();
        assert_eq!(err, SkipReason::DimensionMismatch { expected: 2, got: 1 });
    }

    #[test]
    fn test_prepare_drops_columns_outside_shape() {
        let analyzer = EnglishAnalyzer::new();
        let options = LoadOptions::new(TableShape::Vector, &analyzer);
        let mut dim = None;
        let doc = Document {
            id: "a".to_string(),
            contents: Some("text".to_string()),
            vector: Some(vec![0.5]),
        };
        let prepared = prepare_document(doc, &options, &mut dim).unwrap();
        assert!(prepared.contents.is_none());
    }

    #[test]
    fn test_prepare_rejects_missing_columns() {
        let analyzer = EnglishAnalyzer::new();
        let mut dim = None;
        let both = LoadOptions::new(TableShape::Both, &analyzer);
        assert_eq!(
            prepare_document(Document::text("a", "x"), &both, &mut dim).unwrap_err(),
            SkipReason::MissingVector
        );
        let lexical = LoadOptions::new(TableShape::Lexical, &analyzer);
        assert_eq!(
            prepare_document(Document::embedding("a", vec![1.0]), &lexical, &mut dim).unwrap_err(),
            SkipReason::MissingContents
        );
    }
}
