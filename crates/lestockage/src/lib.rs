//! lestockage - Persistent Storage Layer
//!
//! *Le Stockage* (The Storage) - Record readers, text analysis, bulk loading,
//! and one [`Store`] contract over DuckDB, SQLite, and Postgres

#![warn(missing_docs)]
#![warn(unused_extern_crates)]

/// Text analysis shared by loading and querying.
pub mod analysis;
/// Streaming bulk loads with per-record validation.
pub mod loader;
/// JSONL, TSV, and Parquet record readers.
pub mod records;
/// The store contract and backend factory.
pub mod store;
/// Table names, shapes, and backend descriptors.
pub mod table;
/// Vector literal helpers.
pub mod vector;

/// DuckDB backend.
#[cfg(feature = "duckdb")]
pub mod duck;
/// Parquet input through DuckDB.
#[cfg(feature = "duckdb")]
pub mod parquet;
/// Postgres backend.
#[cfg(feature = "postgres")]
pub mod postgres;
/// SQLite backend.
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use analysis::{Analyzer, EnglishAnalyzer};
pub use loader::{bulk_load, infer_dimension, load_path, LoadError, LoadOptions, LoadStats, DEFAULT_BATCH_SIZE};
pub use records::{open_records, read_records, Document, Query, RecordError, RecordFormat, RecordReader};
pub use store::{open_store, ImportStats, Result, SearchResult, Store, StoreConfig, StoreError};
pub use table::{Backend, Capabilities, LexicalDialect, TableName, TableSchema, TableShape};

#[cfg(feature = "duckdb")]
pub use duck::DuckDbStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
