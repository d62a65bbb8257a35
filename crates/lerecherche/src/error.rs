// Search errors
//
// *L'Erreur* (The Error) - What can stop a plan or a single query

use lestockage::StoreError;
use thiserror::Error;

/// Result type for search operations
pub type Result<T> = std::result::Result<T, SearchError>;

/// Search errors
#[derive(Debug, Error)]
pub enum SearchError {
    /// Invalid mode, table count, or backend pairing
    #[error("Invalid search configuration: {0}")]
    Config(String),

    /// A table that cannot be searched at all
    #[error("Schema error: {0}")]
    Schema(String),

    /// A query the backend cannot run
    #[error("Query {query_id} failed: {reason}")]
    Query {
        /// Offending query
        query_id: String,
        /// What went wrong
        reason: String,
    },

    /// Query vector width differs from the table's
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Table width
        expected: usize,
        /// Query width
        got: usize,
    },

    /// Storage failure during a search
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Run file could not be written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SearchError {
    /// Whether the error comes from the plan rather than one query
    ///
    /// Configuration and schema errors abort a run even when failing queries
    /// are being skipped.
    pub fn is_configuration(&self) -> bool {
        matches!(self, SearchError::Config(_) | SearchError::Schema(_))
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        SearchError::Config(message.into())
    }
}
