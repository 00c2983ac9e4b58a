//! Reciprocal Rank Fusion of dense and sparse result lists.
//!
//! `rrf(d) = sum over lists of 1 / (k + rank(d))` with 1-based ranks;
//! documents absent from a list contribute nothing from it. Ties break on
//! the better dense rank first, then lexicographic id.

use std::collections::HashMap;

/// Externally documented default fusion constant.
pub const RRF_K: f32 = 60.0;

/// Fuse two ranked id lists into `(id, fused_score)` sorted best-first.
pub fn reciprocal_rank_fusion(
    dense: &[String],
    sparse: &[String],
    k: f32,
) -> Vec<(String, f32)> {
    let dense_rank: HashMap<&str, usize> = dense
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i + 1))
        .collect();
    let sparse_rank: HashMap<&str, usize> = sparse
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i + 1))
        .collect();

    let mut ids: Vec<&str> = Vec::with_capacity(dense.len() + sparse.len());
    for id in dense {
        ids.push(id.as_str());
    }
    for id in sparse {
        if !dense_rank.contains_key(id.as_str()) {
            ids.push(id.as_str());
        }
    }

    let mut fused: Vec<(String, f32)> = ids
        .into_iter()
        .map(|id| {
            let mut score = 0.0;
            if let Some(rank) = dense_rank.get(id) {
                score += 1.0 / (k + *rank as f32);
            }
            if let Some(rank) = sparse_rank.get(id) {
                score += 1.0 / (k + *rank as f32);
            }
            (id.to_string(), score)
        })
        .collect();

    fused.sort_by(|(id_a, score_a), (id_b, score_b)| {
        score_b
            .partial_cmp(score_a)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                let rank_a = dense_rank.get(id_a.as_str()).copied().unwrap_or(usize::MAX);
                let rank_b = dense_rank.get(id_b.as_str()).copied().unwrap_or(usize::MAX);
                rank_a.cmp(&rank_b)
            })
            .then_with(|| id_a.cmp(id_b))
    });

    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn document_in_both_lists_wins() {
        let fused = reciprocal_rank_fusion(&ids(&["a", "b"]), &ids(&["b", "c"]), RRF_K);
        assert_eq!(fused[0].0, "b");
        let expected = 1.0 / (60.0 + 2.0) + 1.0 / (60.0 + 1.0);
        assert!((fused[0].1 - expected).abs() < 1e-6);
    }

    #[test]
    fn absent_documents_contribute_nothing() {
        let fused = reciprocal_rank_fusion(&ids(&["a"]), &ids(&[]), RRF_K);
        assert_eq!(fused.len(), 1);
        assert!((fused[0].1 - 1.0 / 61.0).abs() < 1e-6);
    }

    #[test]
    fn ties_break_on_dense_rank_then_id() {
        // "a" only in dense at rank 1, "b" only in sparse at rank 1: equal
        // scores, dense presence wins.
        let fused = reciprocal_rank_fusion(&ids(&["a"]), &ids(&["b"]), RRF_K);
        assert_eq!(fused[0].0, "a");
        assert_eq!(fused[1].0, "b");

        // Neither in dense, same sparse-adjacent structure: lexicographic id.
        let fused = reciprocal_rank_fusion(&ids(&[]), &ids(&["z", "y"]), RRF_K);
        assert_eq!(fused[0].0, "z");
        let fused = reciprocal_rank_fusion(&ids(&["m", "z"]), &ids(&["z", "m"]), RRF_K);
        // Both share the same score; "m" has the better dense rank.
        assert_eq!(fused[0].0, "m");
    }

    #[test]
    fn rank_improvement_never_lowers_score() {
        let before = reciprocal_rank_fusion(&ids(&["x", "d"]), &ids(&["s", "d"]), RRF_K);
        let after = reciprocal_rank_fusion(&ids(&["d", "x"]), &ids(&["s", "d"]), RRF_K);
        let score = |fused: &[(String, f32)]| {
            fused
                .iter()
                .find(|(id, _)| id == "d")
                .map(|(_, s)| *s)
                .unwrap()
        };
        assert!(score(&after) >= score(&before));
    }

    #[test]
    fn empty_lists_fuse_to_empty() {
        assert!(reciprocal_rank_fusion(&[], &[], RRF_K).is_empty());
    }
}
