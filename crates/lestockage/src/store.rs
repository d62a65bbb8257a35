// Store capability interface
//
// *Le Magasin* (The Store) - One contract implemented by every storage engine

use crate::records::Document;
use crate::table::{Backend, Capabilities, InvalidTableName, LexicalDialect, TableName, TableSchema, TableShape};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// A scored document from a single-mode search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Matched document identifier
    pub doc_id: String,

    /// Backend score, higher is better
    pub score: f64,
}

impl SearchResult {
    /// Create a search result
    pub fn new(doc_id: impl Into<String>, score: f64) -> Self {
        Self {
            doc_id: doc_id.into(),
            score,
        }
    }
}

/// Outcome of a native bulk import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportStats {
    /// Rows written
    pub loaded: usize,
    /// Rows rejected (missing id or vector, wrong width, non-finite, duplicate id)
    pub skipped: usize,
}

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite driver error
    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// DuckDB driver error
    #[cfg(feature = "duckdb")]
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// Postgres driver error
    #[cfg(feature = "postgres")]
    #[error("Postgres error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// I/O failure (runtime start-up, files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend cannot perform the operation
    #[error("{backend} does not support {operation}")]
    Unsupported {
        /// Backend asked
        backend: Backend,
        /// Operation requested
        operation: &'static str,
    },

    /// The backend was not compiled into this build
    #[error("{0} support was not compiled in; rebuild with the `{0}` feature")]
    BackendDisabled(Backend),

    /// Introspection found no such table
    #[error("table {0} does not exist")]
    MissingTable(String),

    /// Introspection found neither semantic column
    #[error("table {0} has neither a `contents` nor an `embedding` column")]
    UnknownShape(String),

    /// Embedding text that could not be parsed or rendered
    #[error("invalid vector: {0}")]
    InvalidVector(String),

    /// A table name that sanitizes to nothing
    #[error(transparent)]
    TableName(#[from] InvalidTableName),
}

/// Capability interface over one storage engine
///
/// Every method takes `&mut self`: adapters own a single connection and
/// operations run one at a time.
pub trait Store {
    /// Engine behind this store
    fn backend(&self) -> Backend;

    /// Search operations the engine serves
    fn capabilities(&self) -> Capabilities;

    /// Full-text query syntax the engine accepts
    fn lexical_dialect(&self) -> LexicalDialect;

    /// Drop and recreate `table` with the columns of `shape`
    fn init_table(&mut self, table: &TableName, shape: TableShape, embedding_dim: usize) -> Result<()>;

    /// Insert a batch of already-validated documents, returning rows written
    fn insert_batch(&mut self, table: &TableName, shape: TableShape, docs: &[Document]) -> Result<usize>;

    /// Build (or fully rebuild) the full-text index over `contents`
    fn build_lexical_index(&mut self, table: &TableName) -> Result<()>;

    /// Full-text search with a query already in the engine's dialect
    fn lexical_search(&mut self, table: &TableName, native_query: &str, top_n: usize) -> Result<Vec<SearchResult>>;

    /// Cosine-similarity search, scores in `[-1, 1]`
    fn vector_search(&mut self, table: &TableName, vector: &[f64], top_n: usize) -> Result<Vec<SearchResult>>;

    /// Introspect the table's semantic columns
    fn describe(&mut self, table: &TableName) -> Result<TableSchema>;

    /// Look up the embedding stored under `id`
    fn fetch_vector(&mut self, table: &TableName, id: &str) -> Result<Option<Vec<f64>>>;

    /// Number of rows in the table
    fn row_count(&mut self, table: &TableName) -> Result<usize>;

    /// Fill a vector table straight from a Parquet file
    ///
    /// Engines that scan Parquet themselves return the outcome. `None` means
    /// the caller should stream the file through the loader instead.
    fn import_parquet(&mut self, _table: &TableName, _path: &Path, _embedding_dim: usize) -> Result<Option<ImportStats>> {
        Ok(None)
    }
}

/// Connection settings for [`open_store`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Engine to open
    pub backend: Backend,

    /// Database file for the embedded engines
    pub db_path: PathBuf,

    /// Database name (Postgres)
    pub db_name: String,

    /// User name (Postgres)
    pub db_user: String,

    /// Server host (Postgres)
    pub db_host: String,

    /// Server port (Postgres)
    pub db_port: Option<u16>,

    /// Password (Postgres)
    #[serde(skip_serializing)]
    pub db_password: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::DuckDb,
            db_path: PathBuf::from("database.db"),
            db_name: "quackir".to_string(),
            db_user: "postgres".to_string(),
            db_host: "localhost".to_string(),
            db_port: None,
            db_password: None,
        }
    }
}

/// Open the store named by `config`
pub fn open_store(config: &StoreConfig) -> Result<Box<dyn Store>> {
    tracing::debug!("Opening {} store", config.backend);
    match config.backend {
        #[cfg(feature = "duckdb")]
        Backend::DuckDb => Ok(Box::new(crate::duck::DuckDbStore::open(&config.db_path)?)),
        #[cfg(feature = "sqlite")]
        Backend::Sqlite => Ok(Box::new(crate::sqlite::SqliteStore::open(&config.db_path)?)),
        #[cfg(feature = "postgres")]
        Backend::Postgres => Ok(Box::new(crate::postgres::PostgresStore::connect(config)?)),
        #[allow(unreachable_patterns)]
        other => Err(StoreError::BackendDisabled(other)),
    }
}

/// Resolve a table's schema from its `(column name, column type)` pairs
pub(crate) fn schema_from_columns<I>(table: &TableName, columns: I) -> Result<TableSchema>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut found_any = false;
    let mut has_contents = false;
    let mut embedding_type: Option<String> = None;

    for (name, column_type) in columns {
        found_any = true;
        match name.to_ascii_lowercase().as_str() {
            "contents" => has_contents = true,
            "embedding" => embedding_type = Some(column_type),
            _ => {}
        }
    }

    if !found_any {
        return Err(StoreError::MissingTable(table.to_string()));
    }

    let shape = TableShape::from_columns(has_contents, embedding_type.is_some())
        .ok_or_else(|| StoreError::UnknownShape(table.to_string()))?;
    let embedding_dim = embedding_type.as_deref().and_then(crate::vector::parse_dimension);

    Ok(TableSchema {
        shape,
        embedding_dim,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(n, t)| (n.to_string(), t.to_string()))
            .collect()
    }

    #[test]
    fn test_schema_from_columns() {
        let table = TableName::new("corpus").unwrap();

        let schema = schema_from_columns(&table, columns(&[("id", "VARCHAR"), ("contents", "VARCHAR")])).unwrap();
        assert_eq!(schema.shape, TableShape::Lexical);
        assert_eq!(schema.embedding_dim, None);

        let schema = schema_from_columns(
            &table,
            columns(&[("id", "text"), ("contents", "text"), ("embedding", "vector(4)")]),
        )
        .unwrap();
        assert_eq!(schema.shape, TableShape::Both);
        assert_eq!(schema.embedding_dim, Some(4));
    }

    #[test]
    fn test_schema_errors() {
        let table = TableName::new("corpus").unwrap();
        assert!(matches!(
            schema_from_columns(&table, Vec::new()),
            Err(StoreError::MissingTable(_))
        ));
        assert!(matches!(
            schema_from_columns(&table, columns(&[("id", "VARCHAR")])),
            Err(StoreError::UnknownShape(_))
        ));
    }

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.backend, Backend::DuckDb);
        assert_eq!(config.db_name, "quackir");
    }
}
