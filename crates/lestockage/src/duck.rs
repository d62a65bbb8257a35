// DuckDB adapter
//
// *Le Canard* (The Duck) - BM25 full-text and cosine search in one embedded file

use crate::parquet::{describe_parquet, path_literal, ParquetColumns};
use crate::records::Document;
use crate::store::{schema_from_columns, ImportStats, Result, SearchResult, Store, StoreError};
use crate::table::{quote_identifier, Backend, Capabilities, LexicalDialect, TableName, TableSchema, TableShape};
use crate::vector::{format_vector_literal, parse_vector_literal};
use duckdb::{params, Connection, Result as DuckResult};
use std::path::Path;
use tracing::{debug, info};

/// BM25 term-frequency saturation used by `match_bm25`
pub const BM25_K1: f64 = 0.9;

/// BM25 length normalization used by `match_bm25`
pub const BM25_B: f64 = 0.4;

/// Store backed by DuckDB and its `fts` extension
pub struct DuckDbStore {
    conn: Connection,
    fts_loaded: bool,
}

impl DuckDbStore {
    /// Open (or create) the database file at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            conn: Connection::open(path.as_ref())?,
            fts_loaded: false,
        })
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
            fts_loaded: false,
        })
    }

    /// Load the `fts` extension on first lexical use
    fn ensure_fts(&mut self) -> Result<()> {
        if !self.fts_loaded {
            self.conn.execute_batch("INSTALL fts; LOAD fts;")?;
            self.fts_loaded = true;
        }
        Ok(())
    }

    fn embedding_type(dim: usize) -> String {
        format!("DOUBLE[{}]", dim)
    }

    /// Schema the `fts` extension creates for `table`
    fn fts_schema(table: &TableName) -> String {
        quote_identifier(&format!("fts_main_{}", table))
    }
}

impl Store for DuckDbStore {
    fn backend(&self) -> Backend {
        Backend::DuckDb
    }

    fn capabilities(&self) -> Capabilities {
        Backend::DuckDb.capabilities()
    }

    fn lexical_dialect(&self) -> LexicalDialect {
        LexicalDialect::Bm25Terms
    }

    fn init_table(&mut self, table: &TableName, shape: TableShape, embedding_dim: usize) -> Result<()> {
        let mut columns = vec!["id VARCHAR PRIMARY KEY".to_string()];
        if shape.has_lexical() {
            columns.push("contents VARCHAR".to_string());
        }
        if shape.has_vector() {
            if embedding_dim == 0 {
                return Err(StoreError::InvalidVector(
                    "vector tables need a positive dimension".to_string(),
                ));
            }
            columns.push(format!("embedding {}", Self::embedding_type(embedding_dim)));
        }
        let quoted = table.quoted();
        self.conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS {quoted}; CREATE TABLE {quoted} ({});",
            columns.join(", ")
        ))?;
        debug!("Created DuckDB table {} ({})", table, shape);
        Ok(())
    }

    fn insert_batch(&mut self, table: &TableName, shape: TableShape, docs: &[Document]) -> Result<usize> {
        let dim = docs
            .iter()
            .find_map(|d| d.vector.as_ref().map(Vec::len))
            .unwrap_or(0);
        let quoted = table.quoted();
        let sql = match shape {
            TableShape::Lexical => format!("INSERT INTO {} (id, contents) VALUES (?, ?)", quoted),
            TableShape::Vector => format!(
                "INSERT INTO {} (id, embedding) VALUES (?, CAST(? AS {}))",
                quoted,
                Self::embedding_type(dim)
            ),
            TableShape::Both => format!(
                "INSERT INTO {} (id, contents, embedding) VALUES (?, ?, CAST(? AS {}))",
                quoted,
                Self::embedding_type(dim)
            ),
        };

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for doc in docs {
                let literal = doc.vector.as_deref().map(format_vector_literal);
                match shape {
                    TableShape::Lexical => stmt.execute(params![doc.id, doc.contents])?,
                    TableShape::Vector => stmt.execute(params![doc.id, literal])?,
                    TableShape::Both => stmt.execute(params![doc.id, doc.contents, literal])?,
                };
            }
        }
        tx.commit()?;
        Ok(docs.len())
    }

    fn build_lexical_index(&mut self, table: &TableName) -> Result<()> {
        self.ensure_fts()?;
        // Contents arrive analyzed, so the index must not re-stem or re-case them
        let quoted = table.quoted();
        self.conn.execute_batch(&format!(
            "PRAGMA create_fts_index('{quoted}', 'id', 'contents', stemmer='none', stopwords='none', \
             ignore='a^', strip_accents=0, lower=0, overwrite=1);"
        ))?;
        debug!("Built BM25 index for {}", table);
        Ok(())
    }

    fn lexical_search(&mut self, table: &TableName, native_query: &str, top_n: usize) -> Result<Vec<SearchResult>> {
        self.ensure_fts()?;
        let fts = Self::fts_schema(table);
        let quoted = table.quoted();
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, score FROM (
                 SELECT id, {fts}.match_bm25(id, ?, k := {BM25_K1}, b := {BM25_B}) AS score
                 FROM {quoted}
             ) sq
             WHERE score IS NOT NULL
             ORDER BY score DESC, id ASC
             LIMIT {top_n}"
        ))?;
        let results = stmt
            .query_map(params![native_query], |row| {
                Ok(SearchResult::new(row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?
            .collect::<DuckResult<Vec<_>>>()?;
        Ok(results)
    }

    fn vector_search(&mut self, table: &TableName, vector: &[f64], top_n: usize) -> Result<Vec<SearchResult>> {
        let quoted = table.quoted();
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, array_cosine_similarity(embedding, CAST(? AS {})) AS score
             FROM {quoted}
             WHERE embedding IS NOT NULL
             ORDER BY score DESC, id ASC
             LIMIT {top_n}",
            Self::embedding_type(vector.len())
        ))?;
        let results = stmt
            .query_map(params![format_vector_literal(vector)], |row| {
                Ok(SearchResult::new(row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?
            .collect::<DuckResult<Vec<_>>>()?;
        Ok(results)
    }

    fn describe(&mut self, table: &TableName) -> Result<TableSchema> {
        let mut stmt = self.conn.prepare(
            "SELECT column_name, data_type FROM information_schema.columns
             WHERE table_name = ? ORDER BY ordinal_position",
        )?;
        let columns = stmt
            .query_map(params![table.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<DuckResult<Vec<_>>>()?;
        schema_from_columns(table, columns)
    }

    fn fetch_vector(&mut self, table: &TableName, id: &str) -> Result<Option<Vec<f64>>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT CAST(embedding AS VARCHAR) FROM {} WHERE id = ? LIMIT 1",
            table.quoted()
        ))?;
        let rows = stmt
            .query_map(params![id], |row| row.get::<_, Option<String>>(0))?
            .collect::<DuckResult<Vec<_>>>()?;

        match rows.into_iter().next().flatten() {
            Some(literal) => parse_vector_literal(&literal)
                .map(Some)
                .ok_or(StoreError::InvalidVector(literal)),
            None => Ok(None),
        }
    }

    fn row_count(&mut self, table: &TableName) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table.quoted()), [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn import_parquet(&mut self, table: &TableName, path: &Path, embedding_dim: usize) -> Result<Option<ImportStats>> {
        let described = describe_parquet(&self.conn, path)?;
        let (id, vector) = match ParquetColumns::resolve(&described) {
            Some(ParquetColumns {
                id,
                vector: Some(vector),
                ..
            }) => (quote_identifier(&id), quote_identifier(&vector)),
            _ => return Ok(None),
        };
        let source = path_literal(path);

        // First occurrence of each id wins, matching the streaming loader
        let inserted = self.conn.execute(
            &format!(
                "INSERT INTO {table} (id, embedding)
                 SELECT id, CAST(vec AS {embedding}) FROM (
                     SELECT id, vec, row_number() OVER (PARTITION BY id ORDER BY pos) AS occurrence
                     FROM (
                         SELECT CAST({id} AS VARCHAR) AS id,
                                TRY_CAST({vector} AS DOUBLE[]) AS vec,
                                file_row_number AS pos
                         FROM read_parquet({source}, file_row_number = true)
                     ) src
                     WHERE id IS NOT NULL AND id <> '' AND vec IS NOT NULL
                       AND len(vec) = {embedding_dim}
                       AND list_bool_and(list_transform(vec, x -> isfinite(x)))
                 ) valid
                 WHERE occurrence = 1",
                table = table.quoted(),
                embedding = Self::embedding_type(embedding_dim),
            ),
            [],
        )?;
        let scanned: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM read_parquet({})", source),
            [],
            |row| row.get(0),
        )?;

        let stats = ImportStats {
            loaded: inserted,
            skipped: usize::try_from(scanned).unwrap_or(0).saturating_sub(inserted),
        };
        info!(
            "Imported {} rows into {} from {:?} ({} skipped)",
            stats.loaded, table, path, stats.skipped
        );
        Ok(Some(stats))
    }
}
