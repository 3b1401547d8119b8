/// Blending of vision scores with nearby-observation frequency scores.
///
/// Every taxon appearing in either input gets exactly one output entry. The
/// boost constants (3, 6) and the 0.75 dampener for frequency-only taxa are
/// empirically tuned upstream and preserved verbatim.
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use super::normalize::{normalize, Scored};
use crate::core::request::ScoreFlags;
use crate::sources::TaxonCount;
use crate::taxonomy::AncestryIndex;

/// Dampener applied to taxa that appear only in the frequency data, so a
/// single unmatched nearby taxon never outranks genuine vision matches.
const FREQUENCY_ONLY_FACTOR: f64 = 0.75;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedScore {
    pub taxon_id: u32,
    pub combined_score: f64,
    pub frequency_score: f64,
    pub vision_score: f64,
}

impl Scored for CombinedScore {
    fn score(&self) -> f64 {
        self.combined_score
    }
    fn set_score(&mut self, score: f64) {
        self.combined_score = score;
    }
}

/// Combine normalized vision scores with nearby frequency counts into one
/// ranked list, normalized to 0-100 and truncated to `per_page`.
///
/// With no frequency data at all the contract degrades to the top vision
/// scores unchanged, each reported as its own vision score.
pub fn blend(
    vision: &[TaxonCount],
    nearby: Option<&[TaxonCount]>,
    common_ancestor_id: Option<u32>,
    ancestry: &AncestryIndex,
    flags: &ScoreFlags,
    per_page: usize,
) -> Vec<CombinedScore> {
    let Some(nearby) = nearby else {
        return vision
            .iter()
            .take(per_page)
            .map(|s| CombinedScore {
                taxon_id: s.taxon_id,
                combined_score: s.count,
                frequency_score: 0.0,
                vision_score: s.count,
            })
            .collect();
    };

    let mut frequency_scores: HashMap<u32, f64> = HashMap::new();
    for r in nearby {
        frequency_scores.insert(r.taxon_id, r.count);
    }

    // Boost only with nearby taxa inside the common ancestor when one
    // exists; with no common ancestor every nearby taxon participates.
    let in_scope: Vec<&TaxonCount> = match common_ancestor_id {
        Some(ancestor_id) => nearby
            .iter()
            .filter(|r| ancestry.is_descendant(ancestor_id, r.taxon_id))
            .collect(),
        None => nearby.iter().collect(),
    };
    debug!(
        "blending {} vision scores against {} nearby taxa ({} in scope)",
        vision.len(),
        nearby.len(),
        in_scope.len()
    );

    // Frequency-only taxa start from their dampened frequency share.
    let mut combined: IndexMap<u32, f64> = IndexMap::new();
    let scope_sum: f64 = in_scope.iter().map(|r| r.count).sum();
    if scope_sum > 0.0 {
        for r in &in_scope {
            combined.insert(r.taxon_id, (r.count / scope_sum) * FREQUENCY_ONLY_FACTOR);
        }
    }

    // Vision taxa either get boosted by their frequency ratio or keep their
    // raw vision score.
    let mut vision_scores: HashMap<u32, f64> = HashMap::new();
    for s in vision {
        vision_scores.insert(s.taxon_id, s.count);
        let boosted = match combined.get(&s.taxon_id) {
            Some(frequency_share) if *frequency_share > 0.0 => {
                let ratio = frequency_share / FREQUENCY_ONLY_FACTOR;
                s.count * (3.0 + ratio * 6.0)
            }
            _ => s.count,
        };
        combined.insert(s.taxon_id, boosted);
    }

    let mut results: Vec<CombinedScore> = combined
        .iter()
        .map(|(taxon_id, score)| {
            let vision_score = vision_scores.get(taxon_id).copied().unwrap_or(0.0);
            CombinedScore {
                taxon_id: *taxon_id,
                combined_score: if flags.frequency_only_remove {
                    vision_score
                } else {
                    *score
                },
                frequency_score: frequency_scores.get(taxon_id).copied().unwrap_or(0.0),
                vision_score,
            }
        })
        .collect();

    if flags.must_be_in_frequency || flags.frequency_only_remove {
        results.retain(|s| frequency_scores.contains_key(&s.taxon_id));
    }
    if flags.must_be_in_vision {
        results.retain(|s| s.vision_score > 0.0);
    }

    // Stable sort: equal combined scores keep insertion order.
    results.sort_by(|a, b| {
        b.combined_score
            .partial_cmp(&a.combined_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    normalize(&mut results, 100.0);
    results.truncate(per_page);
    results
}
