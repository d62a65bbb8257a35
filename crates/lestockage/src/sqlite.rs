// SQLite adapter
//
// *Le Petit Carnet* (The Little Notebook) - FTS5 full-text search over an embedded file

use crate::records::Document;
use crate::store::{schema_from_columns, Result, SearchResult, Store, StoreError};
use crate::table::{quote_identifier, Backend, Capabilities, LexicalDialect, TableName, TableSchema, TableShape};
use rusqlite::{params, Connection, Result as SqliteResult};
use std::path::Path;
use tracing::debug;

/// Lexical-only store backed by SQLite FTS5
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database file at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Ok(Self { conn })
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    fn fts_table(table: &TableName) -> String {
        quote_identifier(&format!("fts_{}", table))
    }

    fn unsupported(operation: &'static str) -> StoreError {
        StoreError::Unsupported {
            backend: Backend::Sqlite,
            operation,
        }
    }
}

impl Store for SqliteStore {
    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    fn capabilities(&self) -> Capabilities {
        Backend::Sqlite.capabilities()
    }

    fn lexical_dialect(&self) -> LexicalDialect {
        LexicalDialect::Fts5
    }

    fn init_table(&mut self, table: &TableName, shape: TableShape, _embedding_dim: usize) -> Result<()> {
        if shape.has_vector() {
            return Err(Self::unsupported("vector tables"));
        }
        let fts = Self::fts_table(table);
        let quoted = table.quoted();
        self.conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS {fts};
             DROP TABLE IF EXISTS {quoted};
             CREATE TABLE {quoted} (id TEXT PRIMARY KEY, contents TEXT);"
        ))?;
        debug!("Created SQLite table {}", table);
        Ok(())
    }

    fn insert_batch(&mut self, table: &TableName, shape: TableShape, docs: &[Document]) -> Result<usize> {
        if shape.has_vector() {
            return Err(Self::unsupported("vector tables"));
        }
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!("INSERT INTO {} (id, contents) VALUES (?1, ?2)", table.quoted()))?;
            for doc in docs {
                stmt.execute(params![doc.id, doc.contents])?;
            }
        }
        tx.commit()?;
        Ok(docs.len())
    }

    fn build_lexical_index(&mut self, table: &TableName) -> Result<()> {
        let fts = Self::fts_table(table);
        self.conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS {fts};
             CREATE VIRTUAL TABLE {fts} USING fts5(
                 id UNINDEXED, contents, content='{table}', content_rowid='rowid', tokenize='porter'
             );
             INSERT INTO {fts}({fts}) VALUES('rebuild');"
        ))?;
        debug!("Built FTS5 index {}", fts);
        Ok(())
    }

    fn lexical_search(&mut self, table: &TableName, native_query: &str, top_n: usize) -> Result<Vec<SearchResult>> {
        let fts = Self::fts_table(table);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, -bm25({fts}) AS score FROM {fts}
             WHERE {fts} MATCH ?1
             ORDER BY score DESC, id ASC
             LIMIT ?2"
        ))?;
        let limit = i64::try_from(top_n).unwrap_or(i64::MAX);
        let results = stmt
            .query_map(params![native_query, limit], |row| {
                Ok(SearchResult::new(row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(results)
    }

    fn vector_search(&mut self, _table: &TableName, _vector: &[f64], _top_n: usize) -> Result<Vec<SearchResult>> {
        Err(Self::unsupported("vector search"))
    }

    fn describe(&mut self, table: &TableName) -> Result<TableSchema> {
        let mut stmt = self.conn.prepare("SELECT name, type FROM pragma_table_info(?1)")?;
        let columns = stmt
            .query_map(params![table.as_str()], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<SqliteResult<Vec<_>>>()?;
        schema_from_columns(table, columns)
    }

    fn fetch_vector(&mut self, _table: &TableName, _id: &str) -> Result<Option<Vec<f64>>> {
        Err(Self::unsupported("vector lookup"))
    }

    fn row_count(&mut self, table: &TableName) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table.quoted()), [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}
