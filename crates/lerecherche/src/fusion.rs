// Reciprocal Rank Fusion (RRF)
//
// *La Fusion* (The Fusion) - Two rankings into one, by position alone

use lestockage::SearchResult;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Default RRF smoothing constant
///
/// The value from Cormack, Clarke, and Buettcher (SIGIR 2009). Larger values
/// flatten the advantage of the very top ranks.
pub const DEFAULT_RRF_K: u32 = 60;

/// A document with its fused score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedResult {
    /// Document identifier
    pub doc_id: String,

    /// Sum of `1 / (k + rank)` over the rankings containing the document
    pub rrf_score: f64,
}

impl From<FusedResult> for SearchResult {
    fn from(fused: FusedResult) -> Self {
        SearchResult::new(fused.doc_id, fused.rrf_score)
    }
}

/// 1-based positions of the first `top_n` distinct ids
fn rank_positions(ranking: &[SearchResult], top_n: usize) -> HashMap<&str, usize> {
    let mut ranks = HashMap::with_capacity(ranking.len().min(top_n));
    for (position, result) in ranking.iter().take(top_n).enumerate() {
        ranks.entry(result.doc_id.as_str()).or_insert(position + 1);
    }
    ranks
}

fn contribution(rank: Option<usize>, k: f64) -> f64 {
    match rank {
        Some(rank) => 1.0 / (k + rank as f64),
        None => 0.0,
    }
}

/// Combine a lexical and a vector ranking with RRF
///
/// Each input is cut to `top_n` before ranks are assigned, and native scores
/// are ignored. A document absent from one ranking gets nothing from it. Equal
/// fused scores are ordered by `doc_id` ascending.
pub fn reciprocal_rank_fusion(
    lexical: &[SearchResult],
    vector: &[SearchResult],
    k: u32,
    top_n: usize,
) -> Vec<FusedResult> {
    let k = f64::from(k);
    let lexical_ranks = rank_positions(lexical, top_n);
    let vector_ranks = rank_positions(vector, top_n);

    let mut fused: Vec<FusedResult> = lexical_ranks
        .keys()
        .chain(vector_ranks.keys().filter(|id| !lexical_ranks.contains_key(*id)))
        .map(|id| FusedResult {
            doc_id: (*id).to_string(),
            rrf_score: contribution(lexical_ranks.get(id).copied(), k)
                + contribution(vector_ranks.get(id).copied(), k),
        })
        .collect();

    fused.sort_by(|a, b| {
        b.rrf_score
            .partial_cmp(&a.rrf_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.doc_id.cmp(&b.doc_id))
    });
    fused.truncate(top_n);
    fused
}
