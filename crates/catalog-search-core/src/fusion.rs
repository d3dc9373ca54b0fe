//! Weighted Reciprocal Rank Fusion.
//!
//! Merges a dense and a sparse ranked list using only rank positions. For
//! an item at 0-based rank `r` in a list with weight `w`:
//!
//! ```text
//! partial = w / (k + r + 1)
//! ```
//!
//! Partials from both lists are summed. Raw dense and sparse scores never
//! enter the fused score; they are carried through for display only.
//! Because only ranks matter, both inputs should be over-fetched (2 × topK)
//! so a candidate ranked low in one list but high in the other can still
//! reach the final cut.

use std::collections::HashMap;

pub const DEFAULT_RRF_K: f64 = 60.0;
pub const DEFAULT_DENSE_WEIGHT: f64 = 0.7;
pub const DEFAULT_SPARSE_WEIGHT: f64 = 0.3;

/// One entry of an already-sorted input list.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedHit {
    pub item_id: String,
    pub score: f64,
}

impl RankedHit {
    pub fn new(item_id: impl Into<String>, score: f64) -> Self {
        Self {
            item_id: item_id.into(),
            score,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionParams {
    pub dense_weight: f64,
    pub sparse_weight: f64,
    pub k: f64,
}

impl Default for FusionParams {
    fn default() -> Self {
        Self {
            dense_weight: DEFAULT_DENSE_WEIGHT,
            sparse_weight: DEFAULT_SPARSE_WEIGHT,
            k: DEFAULT_RRF_K,
        }
    }
}

/// A fused result with per-method provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedHit {
    pub item_id: String,
    pub hybrid_score: f64,
    pub dense_score: Option<f64>,
    pub sparse_score: Option<f64>,
    pub dense_rank: Option<usize>,
    pub sparse_rank: Option<usize>,
}

/// Fuse two ranked lists and keep the best `top_k`.
///
/// Ties on the fused score are broken by item id ascending.
pub fn rrf_fuse(
    dense: &[RankedHit],
    sparse: &[RankedHit],
    params: FusionParams,
    top_k: usize,
) -> Vec<FusedHit> {
    let mut fused: HashMap<&str, FusedHit> = HashMap::new();

    for (rank, hit) in dense.iter().enumerate() {
        let entry = fused
            .entry(hit.item_id.as_str())
            .or_insert_with(|| empty_hit(&hit.item_id));
        // First occurrence wins if an id repeats within one list.
        if entry.dense_rank.is_none() {
            entry.hybrid_score += rrf_partial(params.dense_weight, params.k, rank);
            entry.dense_score = Some(hit.score);
            entry.dense_rank = Some(rank);
        }
    }

    for (rank, hit) in sparse.iter().enumerate() {
        let entry = fused
            .entry(hit.item_id.as_str())
            .or_insert_with(|| empty_hit(&hit.item_id));
        if entry.sparse_rank.is_none() {
            entry.hybrid_score += rrf_partial(params.sparse_weight, params.k, rank);
            entry.sparse_score = Some(hit.score);
            entry.sparse_rank = Some(rank);
        }
    }

    let mut results: Vec<FusedHit> = fused.into_values().collect();
    results.sort_by(|a, b| {
        b.hybrid_score
            .partial_cmp(&a.hybrid_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.item_id.cmp(&b.item_id))
    });
    results.truncate(top_k);
    results
}

/// Contribution of one list position: `weight / (k + rank + 1)`.
pub fn rrf_partial(weight: f64, k: f64, rank: usize) -> f64 {
    weight * (1.0 / (k + rank as f64 + 1.0))
}

fn empty_hit(item_id: &str) -> FusedHit {
    FusedHit {
        item_id: item_id.to_string(),
        hybrid_score: 0.0,
        dense_score: None,
        sparse_score: None,
        dense_rank: None,
        sparse_rank: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(ids: &[&str]) -> Vec<RankedHit> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| RankedHit::new(*id, 1.0 - i as f64 * 0.1))
            .collect()
    }

    fn ids(hits: &[FusedHit]) -> Vec<&str> {
        hits.iter().map(|h| h.item_id.as_str()).collect()
    }

    #[test]
    fn test_both_empty() {
        assert!(rrf_fuse(&[], &[], FusionParams::default(), 10).is_empty());
    }

    #[test]
    fn test_in_both_lists_beats_single_list() {
        let dense = list(&["both", "dense_only"]);
        let sparse = list(&["both", "sparse_only"]);
        let fused = rrf_fuse(&dense, &sparse, FusionParams::default(), 10);
        assert_eq!(fused[0].item_id, "both");

        // Rank 0 in both vs rank 0 in the dense list alone.
        let both_score = fused[0].hybrid_score;
        let single = rrf_partial(DEFAULT_DENSE_WEIGHT, DEFAULT_RRF_K, 0);
        assert!(both_score > single);
    }

    #[test]
    fn test_scores_are_summed() {
        let dense = list(&["x"]);
        let sparse = list(&["y", "x"]);
        let fused = rrf_fuse(&dense, &sparse, FusionParams::default(), 10);
        let x = fused.iter().find(|h| h.item_id == "x").unwrap();
        let expected = 0.7 / 61.0 + 0.3 / 62.0;
        assert!((x.hybrid_score - expected).abs() < 1e-12);
        assert_eq!(x.dense_rank, Some(0));
        assert_eq!(x.sparse_rank, Some(1));
        assert!(x.dense_score.is_some() && x.sparse_score.is_some());
    }

    #[test]
    fn test_single_list_keeps_only_its_score() {
        let fused = rrf_fuse(&[], &list(&["a", "b"]), FusionParams::default(), 10);
        assert_eq!(ids(&fused), vec!["a", "b"]);
        assert!(fused[0].dense_score.is_none());
        assert_eq!(fused[0].sparse_score, Some(1.0));
        assert!((fused[0].hybrid_score - 0.3 / 61.0).abs() < 1e-12);
    }

    #[test]
    fn test_raw_scores_do_not_affect_fusion() {
        let dense = vec![RankedHit::new("a", 1000.0), RankedHit::new("b", 0.0001)];
        let sparse = vec![RankedHit::new("b", 0.5), RankedHit::new("a", 0.4)];
        let params = FusionParams {
            dense_weight: 1.0,
            sparse_weight: 1.0,
            k: 60.0,
        };
        let fused = rrf_fuse(&dense, &sparse, params, 10);
        assert!((fused[0].hybrid_score - fused[1].hybrid_score).abs() < 1e-12);
        // Equal fused scores fall back to id order.
        assert_eq!(ids(&fused), vec!["a", "b"]);
    }

    #[test]
    fn test_low_dense_rank_reachable_through_sparse() {
        let dense_ids: Vec<String> = (0..20).map(|i| format!("d{:02}", i)).collect();
        let dense_refs: Vec<&str> = dense_ids.iter().map(String::as_str).collect();
        let dense = list(&dense_refs);
        let sparse = list(&["d15"]);
        let fused = rrf_fuse(&dense, &sparse, FusionParams::default(), 10);
        assert!(ids(&fused).contains(&"d15"));
    }

    #[test]
    fn test_truncates_to_top_k() {
        let fused = rrf_fuse(&list(&["a", "b", "c"]), &list(&["d", "e"]), FusionParams::default(), 2);
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn test_weights_shift_preference() {
        let dense = list(&["d"]);
        let sparse = list(&["s"]);
        let sparse_heavy = FusionParams {
            dense_weight: 0.2,
            sparse_weight: 0.8,
            k: 60.0,
        };
        assert_eq!(rrf_fuse(&dense, &sparse, FusionParams::default(), 2)[0].item_id, "d");
        assert_eq!(rrf_fuse(&dense, &sparse, sparse_heavy, 2)[0].item_id, "s");
    }
}
