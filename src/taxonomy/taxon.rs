/// Taxon records and rank-level conventions
use serde::{Deserialize, Serialize};

/// Rank levels follow the observation platform convention: lower numbers are
/// more specific. Species is 10, kingdom is 70, with intermediate ranks in
/// between (some fractional, e.g. superfamily at 33).
pub mod rank_level {
    pub const SPECIES: f32 = 10.0;
    pub const GENUS: f32 = 20.0;
    pub const FAMILY: f32 = 30.0;
    pub const SUPERFAMILY: f32 = 33.0;
    pub const ORDER: f32 = 40.0;
    pub const CLASS: f32 = 50.0;
    pub const PHYLUM: f32 = 60.0;
    pub const KINGDOM: f32 = 70.0;
}

/// A fully hydrated taxon record as returned by the detail collaborator.
/// `ancestor_ids` is ordered root-first and never contains `id` itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Taxon {
    pub id: u32,
    pub name: String,
    pub rank: String,
    pub rank_level: f32,
    #[serde(default)]
    pub ancestor_ids: Vec<u32>,
    /// Full ancestor records, root-first. Populated only when the taxon was
    /// hydrated with ancestries; parallel to `ancestor_ids` when present.
    #[serde(default)]
    pub ancestors: Vec<Taxon>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl Taxon {
    /// Genus is the hard floor for common-ancestor descent.
    pub fn is_genus(&self) -> bool {
        self.rank == "genus"
    }

    /// Full chain of ids from root to this taxon, inclusive.
    pub fn self_and_ancestor_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.ancestor_ids.iter().copied().chain(std::iter::once(self.id))
    }

    /// Full chain of hydrated records from root to this taxon, inclusive.
    /// Empty ancestors yield a single-element chain.
    pub fn self_and_ancestors(&self) -> impl Iterator<Item = &Taxon> + '_ {
        self.ancestors.iter().chain(std::iter::once(self))
    }
}
