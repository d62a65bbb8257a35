// Search dispatch
//
// *L'Aiguillage* (The Switch) - Mode and tables to store calls, with shape-based auto-detection

use crate::error::{Result, SearchError};
use crate::fusion::{reciprocal_rank_fusion, DEFAULT_RRF_K};
use crate::query::{check_dimension, normalize};
use lestockage::{
    Analyzer, Backend, Capabilities, Query, SearchResult, Store, StoreError, TableName, TableSchema,
    TableShape,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Default number of results per query
pub const DEFAULT_TOP_N: usize = 1000;

/// Retrieval mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Full-text search over one lexical table
    Sparse,
    /// Vector similarity over one vector table
    Dense,
    /// RRF over a lexical and a vector ranking
    Hybrid,
}

impl SearchMode {
    /// Return the string representation of the mode
    pub fn as_str(self) -> &'static str {
        match self {
            SearchMode::Sparse => "sparse",
            SearchMode::Dense => "dense",
            SearchMode::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sparse" | "fts" | "lexical" => Ok(SearchMode::Sparse),
            "dense" | "embedding" | "vector" => Ok(SearchMode::Dense),
            "hybrid" | "rrf" => Ok(SearchMode::Hybrid),
            other => Err(SearchError::config(format!("unknown search mode {:?}", other))),
        }
    }
}

/// A table together with its introspected schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTarget {
    /// Table to search
    pub table: TableName,
    /// Schema snapshot taken when the plan was resolved
    pub schema: TableSchema,
}

impl SearchTarget {
    /// Pair a table with its schema
    pub fn new(table: TableName, schema: TableSchema) -> Self {
        Self { table, schema }
    }
}

/// Resolved search: which tables serve which ranking
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchPlan {
    /// Lexical search on one table
    Sparse(SearchTarget),
    /// Vector search on one table
    Dense(SearchTarget),
    /// Lexical and vector search fused with RRF
    Hybrid {
        /// Table serving the lexical ranking
        lexical: SearchTarget,
        /// Table serving the vector ranking
        vector: SearchTarget,
    },
}

impl SearchPlan {
    /// Mode this plan runs
    pub fn mode(&self) -> SearchMode {
        match self {
            SearchPlan::Sparse(_) => SearchMode::Sparse,
            SearchPlan::Dense(_) => SearchMode::Dense,
            SearchPlan::Hybrid { .. } => SearchMode::Hybrid,
        }
    }

    /// Introspect `tables` and build a plan the store can serve
    ///
    /// Table-count rules and backend capabilities are checked before any
    /// query runs; only schema introspection touches the store.
    pub fn resolve<S>(store: &mut S, mode: Option<SearchMode>, tables: &[TableName]) -> Result<Self>
    where
        S: Store + ?Sized,
    {
        validate_request(mode, tables.len())?;
        if let Some(mode) = mode {
            check_capabilities(&*store, mode)?;
        }

        let mut targets = Vec::with_capacity(tables.len());
        for table in tables {
            let schema = store.describe(table).map_err(|e| match e {
                StoreError::MissingTable(_) | StoreError::UnknownShape(_) => {
                    SearchError::Schema(e.to_string())
                }
                other => SearchError::Store(other),
            })?;
            debug!("Table {} has shape {}", table, schema.shape);
            targets.push(SearchTarget::new(table.clone(), schema));
        }

        let plan = plan_from_shapes(mode, targets)?;
        check_capabilities(&*store, plan.mode())?;
        Ok(plan)
    }
}

/// Reject mode and table-count combinations that can never work
pub fn validate_request(mode: Option<SearchMode>, table_count: usize) -> Result<()> {
    match (mode, table_count) {
        (_, 0) => Err(SearchError::config("at least one table is required")),
        (_, n) if n > 2 => Err(SearchError::config(format!(
            "at most two tables can be searched, got {}",
            n
        ))),
        (Some(mode), 2) if mode != SearchMode::Hybrid => Err(SearchError::config(format!(
            "{} search takes one table; two tables require hybrid mode",
            mode
        ))),
        (Some(SearchMode::Hybrid), 1) => Err(SearchError::config(
            "hybrid search requires exactly two tables, one lexical and one vector",
        )),
        _ => Ok(()),
    }
}

/// Check everything knowable before touching the store
///
/// Runs the table-count rules and, for an explicit mode, the capabilities the
/// backend is built with. Callers use it ahead of opening a connection.
pub fn preflight(mode: Option<SearchMode>, table_count: usize, backend: Backend) -> Result<()> {
    validate_request(mode, table_count)?;
    match mode {
        Some(mode) => ensure_supported(backend, backend.capabilities(), mode),
        None => Ok(()),
    }
}

fn check_capabilities<S: Store + ?Sized>(store: &S, mode: SearchMode) -> Result<()> {
    ensure_supported(store.backend(), store.capabilities(), mode)
}

fn ensure_supported(backend: Backend, caps: Capabilities, mode: SearchMode) -> Result<()> {
    let supported = match mode {
        SearchMode::Sparse => caps.lexical,
        SearchMode::Dense => caps.vector,
        SearchMode::Hybrid => caps.lexical && caps.vector,
    };
    if supported {
        Ok(())
    } else {
        Err(SearchError::config(format!(
            "{} does not support {} search",
            backend, mode
        )))
    }
}

/// Build a plan from schema snapshots alone
///
/// One table: lexical means sparse, vector means dense, and a table with both
/// columns needs an explicit mode. Two tables must differ in shape; the
/// lexical role goes to the table that only has text (or the one that is not
/// vector-only) whatever order the tables were given in.
pub fn plan_from_shapes(mode: Option<SearchMode>, targets: Vec<SearchTarget>) -> Result<SearchPlan> {
    validate_request(mode, targets.len())?;
    let mut targets = targets.into_iter();

    match (targets.next(), targets.next()) {
        (Some(target), None) => plan_single(mode, target),
        (Some(first), Some(second)) => pair_for_hybrid(first, second),
        _ => Err(SearchError::config("at least one table is required")),
    }
}

fn plan_single(mode: Option<SearchMode>, target: SearchTarget) -> Result<SearchPlan> {
    let shape = target.schema.shape;
    match mode {
        Some(SearchMode::Sparse) if shape.has_lexical() => Ok(SearchPlan::Sparse(target)),
        Some(SearchMode::Dense) if shape.has_vector() => Ok(SearchPlan::Dense(target)),
        Some(mode) => Err(SearchError::config(format!(
            "{} search cannot run on {} table {}",
            mode, shape, target.table
        ))),
        None => match shape {
            TableShape::Lexical => Ok(SearchPlan::Sparse(target)),
            TableShape::Vector => Ok(SearchPlan::Dense(target)),
            TableShape::Both => Err(SearchError::config(format!(
                "table {} has both text and vectors; choose a search mode",
                target.table
            ))),
        },
    }
}

fn pair_for_hybrid(first: SearchTarget, second: SearchTarget) -> Result<SearchPlan> {
    use TableShape::*;

    let (lexical, vector) = match (first.schema.shape, second.schema.shape) {
        (Lexical, Vector) | (Both, Vector) | (Lexical, Both) => (first, second),
        (Vector, Lexical) | (Vector, Both) | (Both, Lexical) => (second, first),
        (shape, _) => {
            return Err(SearchError::config(format!(
                "tables {} and {} are both {}; hybrid search needs one lexical and one vector table",
                first.table, second.table, shape
            )));
        }
    };
    Ok(SearchPlan::Hybrid { lexical, vector })
}

/// Per-run search settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Results kept per query
    pub top_n: usize,
    /// RRF smoothing constant
    pub rrf_k: u32,
    /// Query text is already tokenized
    pub pretokenized: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
            rrf_k: DEFAULT_RRF_K,
            pretokenized: false,
        }
    }
}

/// Runs one resolved plan query after query
pub struct Searcher<'a> {
    plan: SearchPlan,
    options: SearchOptions,
    analyzer: &'a dyn Analyzer,
    query_table: Option<TableName>,
}

impl<'a> Searcher<'a> {
    /// Create a searcher with default options
    pub fn new(plan: SearchPlan, analyzer: &'a dyn Analyzer) -> Self {
        Self {
            plan,
            options: SearchOptions::default(),
            analyzer,
            query_table: None,
        }
    }

    /// Replace the search options
    #[must_use]
    pub fn with_options(mut self, options: SearchOptions) -> Self {
        self.options = options;
        self
    }

    /// Look up missing query vectors in `table` by query id
    #[must_use]
    pub fn with_query_table(mut self, table: Option<TableName>) -> Self {
        self.query_table = table;
        self
    }

    /// Plan being executed
    pub fn plan(&self) -> &SearchPlan {
        &self.plan
    }

    /// Options in force
    pub fn options(&self) -> SearchOptions {
        self.options
    }

    /// Run one query
    ///
    /// Results are score-descending, never contain the query's own id, and
    /// number at most `top_n`.
    pub fn search<S: Store + ?Sized>(&self, store: &mut S, query: &Query) -> Result<Vec<SearchResult>> {
        let top_n = self.options.top_n;
        let mut results = match &self.plan {
            SearchPlan::Sparse(target) => self.lexical(store, target, query)?,
            SearchPlan::Dense(target) => self.vector(store, target, query)?,
            SearchPlan::Hybrid { lexical, vector } => {
                let lexical = self.lexical(store, lexical, query)?;
                let vector = self.vector(store, vector, query)?;
                reciprocal_rank_fusion(&lexical, &vector, self.options.rrf_k, top_n)
                    .into_iter()
                    .map(SearchResult::from)
                    .collect()
            }
        };

        filter_self_matches(&mut results, &query.id);
        results.truncate(top_n);
        debug!("Query {} returned {} results", query.id, results.len());
        Ok(results)
    }

    fn lexical<S: Store + ?Sized>(
        &self,
        store: &mut S,
        target: &SearchTarget,
        query: &Query,
    ) -> Result<Vec<SearchResult>> {
        let text = query.contents.as_deref().ok_or_else(|| SearchError::Query {
            query_id: query.id.clone(),
            reason: "lexical search needs query text".to_string(),
        })?;

        let analyzer = if self.options.pretokenized {
            None
        } else {
            Some(self.analyzer)
        };
        let native = normalize(text, store.lexical_dialect(), analyzer);
        if native.trim().is_empty() {
            debug!("Query {} has no searchable terms", query.id);
            return Ok(Vec::new());
        }

        Ok(store.lexical_search(&target.table, &native, self.options.top_n)?)
    }

    fn vector<S: Store + ?Sized>(
        &self,
        store: &mut S,
        target: &SearchTarget,
        query: &Query,
    ) -> Result<Vec<SearchResult>> {
        let fetched;
        let vector = match (&query.vector, &self.query_table) {
            (Some(vector), _) => vector.as_slice(),
            (None, Some(query_table)) => {
                fetched = store.fetch_vector(query_table, &query.id)?.ok_or_else(|| SearchError::Query {
                    query_id: query.id.clone(),
                    reason: format!("no vector stored in {}", query_table),
                })?;
                fetched.as_slice()
            }
            (None, None) => {
                return Err(SearchError::Query {
                    query_id: query.id.clone(),
                    reason: "dense search needs a query vector".to_string(),
                });
            }
        };

        check_dimension(vector, target.schema.embedding_dim)?;
        Ok(store.vector_search(&target.table, vector, self.options.top_n)?)
    }
}

/// Drop results that retrieve the query itself
pub fn filter_self_matches(results: &mut Vec<SearchResult>, query_id: &str) {
    results.retain(|r| r.doc_id != query_id);
}
