/// Common-ancestor inference over the top vision candidates.
///
/// The resolver builds a weighted ancestor tree from a window of scored
/// candidates and walks it downward while a single branch carries enough of
/// the total confidence, summarizing model uncertainty as the most specific
/// taxon still covering the threshold share.
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use super::normalize::{normalize, Scored};
use crate::taxonomy::Taxon;

/// Number of top candidates that participate in ancestor inference.
pub const DEFAULT_ANCESTOR_WINDOW: usize = 10;
/// Minimum accumulated weight (on the 0-100 normalized scale) a node needs
/// for descent to continue into it.
pub const DEFAULT_ANCESTOR_THRESHOLD: f64 = 75.0;
/// The common ancestor can be no coarser than superfamily.
pub const DEFAULT_RANK_LEVEL_CUTOFF: f32 = 33.0;

/// A vision candidate hydrated with its full taxon record, ancestors
/// included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredTaxon {
    pub taxon: Taxon,
    pub vision_score: f64,
}

impl Scored for ScoredTaxon {
    fn score(&self) -> f64 {
        self.vision_score
    }
    fn set_score(&mut self, score: f64) {
        self.vision_score = score;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommonAncestor {
    pub taxon: Taxon,
    pub score: f64,
}

/// Per-request weighted ancestor tree. A node's weight is the summed score
/// of every candidate whose chain passes through it. Roots and child sets
/// preserve first-seen insertion order so ties break deterministically.
#[derive(Default)]
struct AncestorTree {
    roots: IndexMap<u32, Taxon>,
    children: HashMap<u32, IndexMap<u32, Taxon>>,
    weights: HashMap<u32, f64>,
}

impl AncestorTree {
    fn build(candidates: &[ScoredTaxon]) -> Self {
        let mut tree = AncestorTree::default();
        for candidate in candidates {
            let mut parent: Option<u32> = None;
            for node in candidate.taxon.self_and_ancestors() {
                match parent {
                    None => {
                        tree.roots
                            .entry(node.id)
                            .or_insert_with(|| node.clone());
                    }
                    Some(parent_id) => {
                        tree.children
                            .entry(parent_id)
                            .or_default()
                            .entry(node.id)
                            .or_insert_with(|| node.clone());
                    }
                }
                *tree.weights.entry(node.id).or_insert(0.0) += candidate.vision_score;
                parent = Some(node.id);
            }
        }
        tree
    }

    fn weight(&self, taxon_id: u32) -> f64 {
        self.weights.get(&taxon_id).copied().unwrap_or(0.0)
    }

    /// The highest-weight node at a level; strict comparison keeps the
    /// first-seen node on ties.
    fn heaviest<'a>(&self, level: &'a IndexMap<u32, Taxon>) -> Option<&'a Taxon> {
        let mut best: Option<&Taxon> = None;
        for node in level.values() {
            if best.map_or(true, |b| self.weight(node.id) > self.weight(b.id)) {
                best = Some(node);
            }
        }
        best
    }
}

pub struct CommonAncestorResolver {
    window: usize,
    threshold: f64,
    rank_level_cutoff: f32,
}

impl Default for CommonAncestorResolver {
    fn default() -> Self {
        Self::new(
            DEFAULT_ANCESTOR_WINDOW,
            DEFAULT_ANCESTOR_THRESHOLD,
            DEFAULT_RANK_LEVEL_CUTOFF,
        )
    }
}

impl CommonAncestorResolver {
    pub fn new(window: usize, threshold: f64, rank_level_cutoff: f32) -> Self {
        Self {
            window,
            threshold,
            rank_level_cutoff,
        }
    }

    /// Find the most specific taxon covering at least the threshold share of
    /// the top candidates' combined confidence. Returns `None` when no node
    /// meets the threshold or the best node is coarser than the rank-level
    /// cutoff; both are legitimate outcomes, not errors.
    pub fn resolve(&self, candidates: &[ScoredTaxon]) -> Option<CommonAncestor> {
        if candidates.is_empty() {
            return None;
        }
        let mut window: Vec<ScoredTaxon> =
            candidates.iter().take(self.window).cloned().collect();
        normalize(&mut window, 100.0);

        let tree = AncestorTree::build(&window);
        let mut current: Option<&Taxon> = None;
        loop {
            let level = match current {
                None => &tree.roots,
                Some(node) => match tree.children.get(&node.id) {
                    Some(children) => children,
                    None => break,
                },
            };
            let best = match tree.heaviest(level) {
                Some(node) => node,
                None => break,
            };
            if tree.weight(best.id) < self.threshold {
                break;
            }
            current = Some(best);
            // Hard floor: never descend past genus regardless of weight.
            if best.is_genus() {
                break;
            }
        }

        let ancestor = current?;
        if ancestor.rank_level > self.rank_level_cutoff {
            debug!(
                "rejecting common ancestor {} at rank level {}",
                ancestor.id, ancestor.rank_level
            );
            return None;
        }
        Some(CommonAncestor {
            taxon: ancestor.clone(),
            score: tree.weight(ancestor.id),
        })
    }
}
