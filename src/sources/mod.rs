/// Collaborator interfaces the scoring engine depends on.
///
/// These are abstract boundaries: the engine cares about the shape of the
/// data, not the wire. Production wiring (search index clients, database
/// pools) lives outside this crate; tests and the CLI supply their own
/// implementations.
pub mod file;
pub mod frequency;
pub mod vision;

pub use file::FileTaxonSource;
pub use frequency::{CellQuery, FrequencySource, ObservationQuery};
pub use vision::VisionClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::taxonomy::Taxon;
use crate::Result;

/// A raw per-taxon score or observation count from any source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxonCount {
    pub taxon_id: u32,
    pub count: f64,
}

/// One row from the ancestry data source. `ancestry` is a `/`-delimited
/// root-to-parent chain; absent means a root taxon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AncestryRow {
    pub id: u32,
    pub ancestry: Option<String>,
}

/// Locale options passed through to taxon detail hydration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocaleOptions {
    pub locale: Option<String>,
    pub preferred_place_id: Option<u32>,
}

/// The image classification model. One bounded call per request.
#[async_trait]
pub trait VisionScorer: Send + Sync {
    async fn score_image(&self, image: Vec<u8>, filename: &str) -> Result<Vec<TaxonCount>>;
}

/// Ancestry chain lookups backing the [`AncestryIndex`](crate::taxonomy::AncestryIndex).
#[async_trait]
pub trait AncestrySource: Send + Sync {
    async fn ancestries(&self, taxon_ids: &[u32]) -> Result<Vec<AncestryRow>>;
}

/// Nearby-observation aggregation over the search index.
#[async_trait]
pub trait ObservationStore: Send + Sync {
    async fn species_counts(&self, query: &ObservationQuery) -> Result<Vec<TaxonCount>>;
}

/// Precomputed geographic-cell frequency store.
#[async_trait]
pub trait CellStore: Send + Sync {
    async fn cell_counts(&self, query: &CellQuery) -> Result<Vec<TaxonCount>>;
}

/// Taxon detail hydration (names, rank, ancestors).
#[async_trait]
pub trait TaxonSource: Send + Sync {
    async fn resolve(&self, taxon_ids: &[u32], locale: &LocaleOptions) -> Result<Vec<Taxon>>;
}

/// Maps scores of inactive taxa onto their active counterparts, dropping
/// any that cannot be mapped. Returns the updated counts plus the taxon ids
/// the substitution introduced.
#[async_trait]
pub trait TaxonReplacer: Send + Sync {
    async fn replace_inactive(
        &self,
        counts: Vec<TaxonCount>,
    ) -> Result<(Vec<TaxonCount>, Vec<u32>)>;
}
