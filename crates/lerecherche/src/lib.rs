// lerecherche - Retrieval Core
//
// *La Recherche* (The Search) - Sparse, dense, and hybrid search over any store, fused with RRF

#![warn(missing_docs)]
#![warn(unused_extern_crates)]

//! Query normalization, search dispatch, reciprocal rank fusion, and TREC run files.

/// Mode resolution and per-query search.
pub mod dispatch;
/// Search error taxonomy.
pub mod error;
/// Reciprocal rank fusion.
pub mod fusion;
/// Backend dialect query building.
pub mod query;
/// Run-line ordering and run-file output.
pub mod run;

pub use dispatch::{
    filter_self_matches, plan_from_shapes, preflight, validate_request, SearchMode, SearchOptions, SearchPlan,
    SearchTarget, Searcher, DEFAULT_TOP_N,
};
pub use error::{Result, SearchError};
pub use fusion::{reciprocal_rank_fusion, FusedResult, DEFAULT_RRF_K};
pub use query::{check_dimension, clean_tsquery, fts5_match_expression, normalize};
pub use run::{default_run_tag, finalize, natural_key, write_run_file, NaturalKey, RunLine};
