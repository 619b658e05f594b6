//! Hybrid Search fusion (spec §4.9).
//!
//! Fusing is pure: callers fan out to the Vector Index, BM25 Index, and
//! Graph Manager themselves (that orchestration lives at the dispatch
//! layer, which is the only place that knows about all three), then hand
//! this module one raw score per enabled mode per candidate.

use cortex_types::config::HybridWeights;

const EPSILON: f64 = 1e-9;

/// Which signals are enabled for this query. A mode is disabled only when
/// its engine is not configured at all (e.g. no embedding provider) — per
/// spec §4.9, not per-candidate absence. Unreachable-graph and no-keyword-
/// match still report a raw score of `0.0`, not a disabled mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnabledModes {
    pub semantic: bool,
    pub keyword: bool,
    pub graph: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RawModeScores {
    pub semantic: f64,
    pub keyword: f64,
    pub graph: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NormalizedModeScores {
    pub semantic: Option<f64>,
    pub keyword: Option<f64>,
    pub graph: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Candidate<Id> {
    pub id: Id,
    pub raw: RawModeScores,
}

#[derive(Debug, Clone)]
pub struct FusedResult<Id> {
    pub id: Id,
    pub hybrid_score: f64,
    pub mode_scores: NormalizedModeScores,
    pub search_modes: Vec<&'static str>,
}

/// Zeroes the weight of every disabled mode and renormalizes the rest to
/// sum to 1.0, per spec §4.9: "that mode is omitted and its weight
/// redistributed proportionally."
#[must_use]
pub fn redistribute_weights(weights: HybridWeights, enabled: EnabledModes) -> HybridWeights {
    let semantic = if enabled.semantic { weights.semantic } else { 0.0 };
    let keyword = if enabled.keyword { weights.keyword } else { 0.0 };
    let graph = if enabled.graph { weights.graph } else { 0.0 };
    let sum = semantic + keyword + graph;
    if sum <= EPSILON {
        return HybridWeights {
            semantic: 0.0,
            keyword: 0.0,
            graph: 0.0,
        };
    }
    HybridWeights {
        semantic: semantic / sum,
        keyword: keyword / sum,
        graph: graph / sum,
    }
}

/// Min-max normalizes into `[0, 1]`. When every value in the set is equal
/// (including the degenerate single-candidate case), every candidate is
/// treated as maximally relevant relative to its peers — an open design
/// choice documented in DESIGN.md.
fn min_max_normalize(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if (max - min).abs() <= EPSILON {
        return vec![1.0; values.len()];
    }
    values.iter().map(|v| (v - min) / (max - min)).collect()
}

/// Fuses candidates into ranked `FusedResult`s. `weights` must already be
/// (re)normalized to sum to ~1.0 — callers typically pass
/// `redistribute_weights(configured_weights, enabled)`.
#[must_use]
pub fn fuse<Id: Clone>(
    candidates: Vec<Candidate<Id>>,
    weights: HybridWeights,
    enabled: EnabledModes,
) -> Vec<FusedResult<Id>> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let semantic_norm = if enabled.semantic {
        min_max_normalize(&candidates.iter().map(|c| c.raw.semantic).collect::<Vec<_>>())
    } else {
        vec![]
    };
    let keyword_norm = if enabled.keyword {
        min_max_normalize(&candidates.iter().map(|c| c.raw.keyword).collect::<Vec<_>>())
    } else {
        vec![]
    };
    let graph_norm = if enabled.graph {
        min_max_normalize(&candidates.iter().map(|c| c.raw.graph).collect::<Vec<_>>())
    } else {
        vec![]
    };

    let mut results: Vec<FusedResult<Id>> = candidates
        .into_iter()
        .enumerate()
        .map(|(i, candidate)| {
            let mut hybrid = 0.0;
            let mut modes = Vec::new();
            let mut mode_scores = NormalizedModeScores::default();

            if enabled.semantic {
                let s = semantic_norm[i];
                hybrid += weights.semantic * s;
                mode_scores.semantic = Some(s);
                modes.push("semantic");
            }
            if enabled.keyword {
                let s = keyword_norm[i];
                hybrid += weights.keyword * s;
                mode_scores.keyword = Some(s);
                modes.push("keyword");
            }
            if enabled.graph {
                let s = graph_norm[i];
                hybrid += weights.graph * s;
                mode_scores.graph = Some(s);
                modes.push("graph");
            }

            FusedResult {
                id: candidate.id,
                hybrid_score: hybrid.clamp(0.0, 1.0),
                mode_scores,
                search_modes: modes,
            }
        })
        .collect();

    results.sort_by(|a, b| {
        b.hybrid_score
            .partial_cmp(&a.hybrid_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_enabled() -> EnabledModes {
        EnabledModes {
            semantic: true,
            keyword: true,
            graph: true,
        }
    }

    #[test]
    fn hybrid_scores_are_bounded_in_unit_interval() {
        let candidates = vec![
            Candidate {
                id: "a",
                raw: RawModeScores {
                    semantic: 0.9,
                    keyword: 12.0,
                    graph: 1.0,
                },
            },
            Candidate {
                id: "b",
                raw: RawModeScores {
                    semantic: 0.1,
                    keyword: 0.0,
                    graph: 0.0,
                },
            },
        ];
        let fused = fuse(candidates, HybridWeights::default(), all_enabled());
        for result in &fused {
            assert!(result.hybrid_score >= 0.0 && result.hybrid_score <= 1.0);
        }
        assert!(fused[0].hybrid_score >= fused[1].hybrid_score);
    }

    #[test]
    fn disabled_mode_does_not_influence_ranking() {
        let candidates = vec![
            Candidate {
                id: "a",
                raw: RawModeScores {
                    semantic: 1.0,
                    keyword: 0.0,
                    graph: 0.0,
                },
            },
            Candidate {
                id: "b",
                raw: RawModeScores {
                    semantic: 0.0,
                    keyword: 5.0,
                    graph: 0.0,
                },
            },
        ];
        let enabled = EnabledModes {
            semantic: false,
            keyword: true,
            graph: false,
        };
        let weights = redistribute_weights(HybridWeights::default(), enabled);
        assert!((weights.keyword - 1.0).abs() < 1e-9);
        let fused = fuse(candidates, weights, enabled);
        assert_eq!(fused[0].id, "b");
        assert!(fused.iter().all(|r| r.mode_scores.semantic.is_none()));
    }

    #[test]
    fn results_are_non_increasing() {
        let candidates = (0..5)
            .map(|i| Candidate {
                id: i,
                raw: RawModeScores {
                    semantic: f64::from(i),
                    keyword: f64::from(5 - i),
                    graph: 0.0,
                },
            })
            .collect();
        let enabled = EnabledModes {
            semantic: true,
            keyword: true,
            graph: false,
        };
        let weights = redistribute_weights(HybridWeights::default(), enabled);
        let fused = fuse(candidates, weights, enabled);
        for pair in fused.windows(2) {
            assert!(pair[0].hybrid_score >= pair[1].hybrid_score);
        }
    }
}
