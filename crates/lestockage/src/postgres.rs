// Postgres adapter
//
// *Le Serveur* (The Server) - ts_rank full-text and pgvector cosine search

use crate::records::Document;
use crate::store::{schema_from_columns, Result, SearchResult, Store, StoreConfig, StoreError};
use crate::table::{quote_identifier, Backend, Capabilities, LexicalDialect, TableName, TableSchema, TableShape};
use crate::vector::{format_vector_literal, parse_vector_literal};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info};

/// Store backed by a Postgres server with the pgvector extension
///
/// sqlx is async; the adapter drives one connection on a private
/// current-thread runtime so callers stay synchronous.
pub struct PostgresStore {
    runtime: Runtime,
    conn: PgConnection,
}

impl PostgresStore {
    /// Connect with the settings in `config`
    pub fn connect(config: &StoreConfig) -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;

        let mut options = PgConnectOptions::new()
            .host(&config.db_host)
            .username(&config.db_user)
            .database(&config.db_name);
        if let Some(port) = config.db_port {
            options = options.port(port);
        }
        if let Some(password) = &config.db_password {
            options = options.password(password);
        }

        let conn = runtime.block_on(PgConnection::connect_with(&options))?;
        info!(
            "Connected to Postgres {}@{}/{}",
            config.db_user, config.db_host, config.db_name
        );
        Ok(Self { runtime, conn })
    }

    fn index_name(table: &TableName) -> String {
        quote_identifier(&format!("{}_contents_gin", table))
    }
}

/// Postgres text cannot hold NUL
fn scrub_nul(contents: &str) -> String {
    contents.replace('\0', "\u{FFFD}")
}

impl Store for PostgresStore {
    fn backend(&self) -> Backend {
        Backend::Postgres
    }

    fn capabilities(&self) -> Capabilities {
        Backend::Postgres.capabilities()
    }

    fn lexical_dialect(&self) -> LexicalDialect {
        LexicalDialect::TsQuery
    }

    fn init_table(&mut self, table: &TableName, shape: TableShape, embedding_dim: usize) -> Result<()> {
        let mut columns = vec!["id TEXT PRIMARY KEY".to_string()];
        if shape.has_lexical() {
            columns.push("contents TEXT".to_string());
        }
        if shape.has_vector() {
            if embedding_dim == 0 {
                return Err(StoreError::InvalidVector(
                    "vector tables need a positive dimension".to_string(),
                ));
            }
            columns.push(format!("embedding vector({})", embedding_dim));
        }
        let create = format!("CREATE TABLE {} ({})", table.quoted(), columns.join(", "));
        let drop = format!("DROP TABLE IF EXISTS {}", table.quoted());

        let conn = &mut self.conn;
        self.runtime.block_on(async {
            if shape.has_vector() {
                sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
                    .execute(&mut *conn)
                    .await?;
            }
            sqlx::query(&drop).execute(&mut *conn).await?;
            sqlx::query(&create).execute(&mut *conn).await?;
            Ok::<_, sqlx::Error>(())
        })?;
        debug!("Created Postgres table {} ({})", table, shape);
        Ok(())
    }

    fn insert_batch(&mut self, table: &TableName, shape: TableShape, docs: &[Document]) -> Result<usize> {
        let quoted = table.quoted();
        let sql = match shape {
            TableShape::Lexical => format!("INSERT INTO {} (id, contents) VALUES ($1, $2)", quoted),
            TableShape::Vector => format!("INSERT INTO {} (id, embedding) VALUES ($1, $2::vector)", quoted),
            TableShape::Both => format!(
                "INSERT INTO {} (id, contents, embedding) VALUES ($1, $2, $3::vector)",
                quoted
            ),
        };

        let conn = &mut self.conn;
        self.runtime.block_on(async {
            let mut tx = conn.begin().await?;
            for doc in docs {
                let contents = doc.contents.as_deref().map(scrub_nul);
                let literal = doc.vector.as_deref().map(format_vector_literal);
                let query = sqlx::query(&sql).bind(&doc.id);
                let query = match shape {
                    TableShape::Lexical => query.bind(contents),
                    TableShape::Vector => query.bind(literal),
                    TableShape::Both => query.bind(contents).bind(literal),
                };
                query.execute(&mut *tx).await?;
            }
            tx.commit().await?;
            Ok::<_, sqlx::Error>(())
        })?;
        Ok(docs.len())
    }

    fn build_lexical_index(&mut self, table: &TableName) -> Result<()> {
        let index = Self::index_name(table);
        let drop = format!("DROP INDEX IF EXISTS {}", index);
        let create = format!(
            "CREATE INDEX {} ON {} USING GIN (to_tsvector('simple', contents))",
            index,
            table.quoted()
        );

        let conn = &mut self.conn;
        self.runtime.block_on(async {
            sqlx::query(&drop).execute(&mut *conn).await?;
            sqlx::query(&create).execute(&mut *conn).await?;
            Ok::<_, sqlx::Error>(())
        })?;
        debug!("Built GIN index {}", index);
        Ok(())
    }

    fn lexical_search(&mut self, table: &TableName, native_query: &str, top_n: usize) -> Result<Vec<SearchResult>> {
        let quoted = table.quoted();
        let sql = format!(
            "SELECT id, ts_rank(to_tsvector('simple', contents), to_tsquery('simple', $1))::float8 AS score
             FROM {quoted}
             WHERE to_tsvector('simple', contents) @@ to_tsquery('simple', $1)
             ORDER BY score DESC, id ASC
             LIMIT $2"
        );
        let limit = i64::try_from(top_n).unwrap_or(i64::MAX);

        let conn = &mut self.conn;
        let rows: Vec<(String, f64)> = self.runtime.block_on(
            sqlx::query_as(&sql)
                .bind(native_query)
                .bind(limit)
                .fetch_all(&mut *conn),
        )?;
        Ok(rows
            .into_iter()
            .map(|(id, score)| SearchResult::new(id, score))
            .collect())
    }

    fn vector_search(&mut self, table: &TableName, vector: &[f64], top_n: usize) -> Result<Vec<SearchResult>> {
        let quoted = table.quoted();
        let sql = format!(
            "SELECT id, (1 - (embedding <=> $1::vector))::float8 AS score
             FROM {quoted}
             WHERE embedding IS NOT NULL
             ORDER BY embedding <=> $1::vector, id ASC
             LIMIT $2"
        );
        let limit = i64::try_from(top_n).unwrap_or(i64::MAX);

        let conn = &mut self.conn;
        let rows: Vec<(String, f64)> = self.runtime.block_on(
            sqlx::query_as(&sql)
                .bind(format_vector_literal(vector))
                .bind(limit)
                .fetch_all(&mut *conn),
        )?;
        Ok(rows
            .into_iter()
            .map(|(id, score)| SearchResult::new(id, score))
            .collect())
    }

    fn describe(&mut self, table: &TableName) -> Result<TableSchema> {
        let conn = &mut self.conn;
        let columns: Vec<(String, String)> = self.runtime.block_on(
            sqlx::query_as(
                "SELECT a.attname::text, format_type(a.atttypid, a.atttypmod)
                 FROM pg_attribute a
                 JOIN pg_class c ON a.attrelid = c.oid
                 WHERE c.relname = $1
                   AND pg_table_is_visible(c.oid)
                   AND a.attnum > 0
                   AND NOT a.attisdropped
                 ORDER BY a.attnum",
            )
            .bind(table.as_str())
            .fetch_all(&mut *conn),
        )?;
        schema_from_columns(table, columns)
    }

    fn fetch_vector(&mut self, table: &TableName, id: &str) -> Result<Option<Vec<f64>>> {
        let sql = format!("SELECT embedding::text FROM {} WHERE id = $1 LIMIT 1", table.quoted());
        let conn = &mut self.conn;
        let row: Option<(Option<String>,)> = self
            .runtime
            .block_on(sqlx::query_as(&sql).bind(id).fetch_optional(&mut *conn))?;

        match row.and_then(|(literal,)| literal) {
            Some(literal) => parse_vector_literal(&literal)
                .map(Some)
                .ok_or(StoreError::InvalidVector(literal)),
            None => Ok(None),
        }
    }

    fn row_count(&mut self, table: &TableName) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.quoted());
        let conn = &mut self.conn;
        let (count,): (i64,) = self
            .runtime
            .block_on(sqlx::query_as(&sql).fetch_one(&mut *conn))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}
