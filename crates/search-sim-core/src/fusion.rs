//! Hybrid score fusion (spec §4.3 step 3, §9).
//!
//! The primary path is a fixed 0.5 text / 0.5 vector weighted sum — the
//! spec's §9 Open-Question resolution keeps the source system's fixed
//! formula even though the config surface exposes `textWeight`/
//! `vectorWeight` and an alternate `rrf` fusion kind. Reciprocal Rank
//! Fusion is implemented as that alternate, selected via
//! `HybridConfig::fusion`.

use std::cmp::Ordering;
use std::collections::HashMap;

use search_sim_types::config::{FusionKind, HybridConfig};

use crate::document::DocKey;

/// One side's contribution to a hybrid candidate: a score plus the rank it
/// occupied within its own ranked list (1-based), used by RRF.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceRank {
    pub score: f32,
    pub rank: usize,
}

/// A document candidate for fusion, built from the text set Q and/or the
/// vector set V (spec §4.3 step 3: "documents present in only one side
/// contribute 0 on the absent side").
#[derive(Debug, Clone, Default)]
pub struct HybridCandidate {
    pub key: DocKey,
    pub text: Option<SourceRank>,
    pub vector: Option<SourceRank>,
}

/// A fused hit: a key and its combined score, ready for the scoring-profile
/// multiplier (spec §4.7) and final sort.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedHit {
    pub key: DocKey,
    pub score: f32,
}

/// Builds the combined set C = Q ∪ V from independently-scored text and
/// vector result lists, recording each side's rank for RRF's benefit even
/// when the weighted-sum path (which only needs the raw scores) is used.
#[must_use]
pub fn combine_candidates(
    text_hits: &[(DocKey, f32)],
    vector_hits: &[(DocKey, f32)],
) -> Vec<HybridCandidate> {
    let mut by_key: HashMap<DocKey, HybridCandidate> = HashMap::new();

    for (rank, (key, score)) in text_hits.iter().enumerate() {
        by_key
            .entry(key.clone())
            .or_insert_with(|| HybridCandidate {
                key: key.clone(),
                ..Default::default()
            })
            .text = Some(SourceRank {
            score: *score,
            rank: rank + 1,
        });
    }

    for (rank, (key, score)) in vector_hits.iter().enumerate() {
        by_key
            .entry(key.clone())
            .or_insert_with(|| HybridCandidate {
                key: key.clone(),
                ..Default::default()
            })
            .vector = Some(SourceRank {
            score: *score,
            rank: rank + 1,
        });
    }

    by_key.into_values().collect()
}

/// Fuses candidates per the configured [`FusionKind`].
#[must_use]
pub fn fuse(candidates: &[HybridCandidate], config: &HybridConfig) -> Vec<FusedHit> {
    match config.fusion {
        FusionKind::Weighted => fuse_weighted(candidates, config),
        FusionKind::Rrf => fuse_rrf(candidates, config.rrf_k),
    }
}

/// Weighted-sum fusion: `textWeight * textScore + vectorWeight * vectorScore`,
/// with an absent side contributing 0 (spec §4.3 step 3).
#[must_use]
pub fn fuse_weighted(candidates: &[HybridCandidate], config: &HybridConfig) -> Vec<FusedHit> {
    let mut hits: Vec<FusedHit> = candidates
        .iter()
        .map(|c| {
            let text = c.text.map_or(0.0, |s| s.score) * config.text_weight;
            let vector = c.vector.map_or(0.0, |s| s.score) * config.vector_weight;
            FusedHit {
                key: c.key.clone(),
                score: text + vector,
            }
        })
        .collect();
    sort_fused(&mut hits);
    hits
}

/// Reciprocal Rank Fusion: `sum over sources present of 1 / (k + rank)`.
#[must_use]
pub fn fuse_rrf(candidates: &[HybridCandidate], k: f64) -> Vec<FusedHit> {
    let mut hits: Vec<FusedHit> = candidates
        .iter()
        .map(|c| {
            let mut score = 0.0_f64;
            if let Some(text) = c.text {
                score += 1.0 / (k + text.rank as f64);
            }
            if let Some(vector) = c.vector {
                score += 1.0 / (k + vector.rank as f64);
            }
            FusedHit {
                key: c.key.clone(),
                score: score as f32,
            }
        })
        .collect();
    sort_fused(&mut hits);
    hits
}

/// Sorts fused hits by score descending with a stable key-ascending
/// tie-break (spec §4.3 step 4).
fn sort_fused(hits: &mut [FusedHit]) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.key.cmp(&b.key))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weighted_config() -> HybridConfig {
        HybridConfig::default()
    }

    #[test]
    fn absent_side_contributes_zero() {
        let candidates = combine_candidates(&[("a".to_owned(), 0.8)], &[("b".to_owned(), 0.9)]);
        let fused = fuse_weighted(&candidates, &weighted_config());
        let a = fused.iter().find(|h| h.key == "a").unwrap();
        let b = fused.iter().find(|h| h.key == "b").unwrap();
        assert!((a.score - 0.4).abs() < 1e-6);
        assert!((b.score - 0.45).abs() < 1e-6);
    }

    #[test]
    fn weighted_sum_uses_fixed_half_half_by_default() {
        let candidates = combine_candidates(&[("a".to_owned(), 1.0)], &[("a".to_owned(), 1.0)]);
        let fused = fuse_weighted(&candidates, &weighted_config());
        assert!((fused[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn rrf_scores_rank_one_in_both_sources_highest() {
        let candidates = combine_candidates(
            &[("a".to_owned(), 10.0), ("b".to_owned(), 5.0)],
            &[("a".to_owned(), 0.9), ("c".to_owned(), 0.8)],
        );
        let fused = fuse_rrf(&candidates, 60.0);
        assert_eq!(fused[0].key, "a");
    }

    #[test]
    fn tie_break_is_key_ascending() {
        let candidates = vec![
            HybridCandidate {
                key: "z".to_owned(),
                text: Some(SourceRank { score: 1.0, rank: 1 }),
                vector: None,
            },
            HybridCandidate {
                key: "a".to_owned(),
                text: Some(SourceRank { score: 1.0, rank: 1 }),
                vector: None,
            },
        ];
        let fused = fuse_weighted(&candidates, &weighted_config());
        assert_eq!(fused[0].key, "a");
        assert_eq!(fused[1].key, "z");
    }

    #[test]
    fn fuse_dispatches_on_configured_kind() {
        let candidates = combine_candidates(&[("a".to_owned(), 1.0)], &[]);
        let mut config = weighted_config();
        config.fusion = FusionKind::Rrf;
        let fused = fuse(&candidates, &config);
        assert!((fused[0].score - 1.0 / 61.0).abs() < 1e-6);
    }
}
