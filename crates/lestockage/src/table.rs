// Table identity and shape
//
// *La Table* (The Table) - Which semantic columns a storage table exposes

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sanitized table identifier
///
/// Table names are interpolated into SQL, so only ASCII lowercase letters,
/// digits, and `_` survive. Everything else becomes `_`, a leading digit gets a
/// `t_` prefix, and uppercase is folded so introspection agrees with Postgres'
/// folding of unquoted identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableName(String);

impl TableName {
    /// Sanitize a raw name into a table identifier
    pub fn new(raw: &str) -> Result<Self, InvalidTableName> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(InvalidTableName(raw.to_string()));
        }

        let mut name: String = trimmed
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect();

        if name.starts_with(|c: char| c.is_ascii_digit()) {
            name.insert_str(0, "t_");
        }

        Ok(Self(name))
    }

    /// The sanitized identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identifier double-quoted for SQL, so keywords such as `order` stay usable
    pub fn quoted(&self) -> String {
        quote_identifier(&self.0)
    }
}

/// Double-quote an SQL identifier, doubling any embedded `"`
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TableName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Raised for names that sanitize to nothing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid table name: {0:?}")]
pub struct InvalidTableName(pub String);

/// Semantic columns carried by a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableShape {
    /// `id` + `contents`
    Lexical,
    /// `id` + `embedding`
    Vector,
    /// `id` + `contents` + `embedding`
    Both,
}

impl TableShape {
    /// Whether the table carries a `contents` column
    pub fn has_lexical(self) -> bool {
        matches!(self, TableShape::Lexical | TableShape::Both)
    }

    /// Whether the table carries an `embedding` column
    pub fn has_vector(self) -> bool {
        matches!(self, TableShape::Vector | TableShape::Both)
    }

    /// Derive the shape from the presence of the two semantic columns
    pub fn from_columns(has_contents: bool, has_embedding: bool) -> Option<Self> {
        match (has_contents, has_embedding) {
            (true, true) => Some(TableShape::Both),
            (true, false) => Some(TableShape::Lexical),
            (false, true) => Some(TableShape::Vector),
            (false, false) => None,
        }
    }

    /// Return the string representation of the shape
    pub fn as_str(self) -> &'static str {
        match self {
            TableShape::Lexical => "lexical",
            TableShape::Vector => "vector",
            TableShape::Both => "both",
        }
    }
}

impl fmt::Display for TableShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a table's searchable columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Shape derived from the column set
    pub shape: TableShape,

    /// Width of the `embedding` column, when the backend reports one
    pub embedding_dim: Option<usize>,
}

/// Storage engine behind a [`crate::Store`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Embedded analytical database
    DuckDb,
    /// Embedded relational database
    Sqlite,
    /// Client/server relational database with pgvector
    Postgres,
}

impl Backend {
    /// Return the string representation of the backend
    pub fn as_str(self) -> &'static str {
        match self {
            Backend::DuckDb => "duckdb",
            Backend::Sqlite => "sqlite",
            Backend::Postgres => "postgres",
        }
    }

    /// Search operations the engine serves, known without connecting
    pub fn capabilities(self) -> Capabilities {
        match self {
            Backend::Sqlite => Capabilities {
                lexical: true,
                vector: false,
            },
            Backend::DuckDb | Backend::Postgres => Capabilities {
                lexical: true,
                vector: true,
            },
        }
    }

    /// Create a backend from its string representation
    pub fn from_str_name(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "duckdb" | "duck" => Some(Backend::DuckDb),
            "sqlite" | "sqlite3" => Some(Backend::Sqlite),
            "postgres" | "postgresql" | "pg" => Some(Backend::Postgres),
            _ => None,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full-text query syntax a backend accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LexicalDialect {
    /// Whitespace-separated terms scored with BM25 (DuckDB `fts`)
    Bm25Terms,
    /// SQLite FTS5 `MATCH` expression
    Fts5,
    /// Postgres `to_tsquery` expression
    TsQuery,
}

/// Search operations a backend can serve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Full-text search over `contents`
    pub lexical: bool,

    /// Similarity search over `embedding`
    pub vector: bool,
}

impl Capabilities {
    /// Whether tables of `shape` can be created on this backend
    pub fn supports_shape(self, shape: TableShape) -> bool {
        (!shape.has_lexical() || self.lexical) && (!shape.has_vector() || self.vector)
    }
}
