/// The scoring pipeline.
///
/// One engine instance owns the process-wide taxonomy index and result cache
/// and holds handles to every external collaborator. Each request flows
/// through: fingerprint memoization, vision scoring, inactive-taxon
/// substitution, taxon-scope filtering, common-ancestor inference, frequency
/// blending, and detail hydration. All per-request state is local to the
/// call; concurrent requests share only the index and the cache.
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core::config::{FrequencyBackend, ScoringConfig};
use crate::core::request::ScoreRequest;
use crate::scoring::blend::{blend, CombinedScore};
use crate::scoring::common_ancestor::{CommonAncestor, CommonAncestorResolver, ScoredTaxon};
use crate::scoring::normalize::normalize;
use crate::sources::frequency::FrequencySource;
use crate::sources::{
    CellStore, LocaleOptions, ObservationStore, TaxonCount, TaxonReplacer, TaxonSource,
    VisionScorer,
};
use crate::storage::ResultCache;
use crate::taxonomy::{AncestryIndex, Taxon};
use crate::Result;

/// One ranked entry of the final response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredResult {
    pub taxon: Taxon,
    pub combined_score: f64,
    pub frequency_score: f64,
    pub vision_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreResponse {
    pub results: Vec<ScoredResult>,
    pub common_ancestor: Option<CommonAncestor>,
}

impl ScoreResponse {
    fn empty() -> Self {
        Self {
            results: Vec::new(),
            common_ancestor: None,
        }
    }
}

pub struct ScoreEngine {
    ancestry: Arc<AncestryIndex>,
    cache: Arc<ResultCache>,
    vision: Arc<dyn VisionScorer>,
    taxa: Arc<dyn TaxonSource>,
    observation_store: Option<Arc<dyn ObservationStore>>,
    cell_store: Option<Arc<dyn CellStore>>,
    replacer: Option<Arc<dyn TaxonReplacer>>,
    default_backend: FrequencyBackend,
    scoring: ScoringConfig,
}

impl ScoreEngine {
    pub fn new(
        ancestry: Arc<AncestryIndex>,
        cache: Arc<ResultCache>,
        vision: Arc<dyn VisionScorer>,
        taxa: Arc<dyn TaxonSource>,
    ) -> Self {
        Self {
            ancestry,
            cache,
            vision,
            taxa,
            observation_store: None,
            cell_store: None,
            replacer: None,
            default_backend: FrequencyBackend::Observations,
            scoring: ScoringConfig::default(),
        }
    }

    pub fn with_observation_store(mut self, store: Arc<dyn ObservationStore>) -> Self {
        self.observation_store = Some(store);
        self
    }

    pub fn with_cell_store(mut self, store: Arc<dyn CellStore>) -> Self {
        self.cell_store = Some(store);
        self
    }

    pub fn with_replacer(mut self, replacer: Arc<dyn TaxonReplacer>) -> Self {
        self.replacer = Some(replacer);
        self
    }

    pub fn with_default_backend(mut self, backend: FrequencyBackend) -> Self {
        self.default_backend = backend;
        self
    }

    pub fn with_scoring(mut self, scoring: ScoringConfig) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn ancestry(&self) -> &AncestryIndex {
        &self.ancestry
    }

    /// Score an image and fuse the vision output with nearby-observation
    /// priors into a ranked taxa list plus an inferred common ancestor.
    pub async fn score_image(
        &self,
        request: &ScoreRequest,
        image: Vec<u8>,
        filename: &str,
    ) -> Result<ScoreResponse> {
        let fingerprint = request.fingerprint(&image);
        if let Some(bytes) = self.cache.get(&fingerprint) {
            match serde_json::from_slice::<ScoreResponse>(&bytes) {
                Ok(response) => {
                    debug!("cache hit for {}", fingerprint);
                    return Ok(response);
                }
                Err(e) => warn!("discarding undecodable cache entry {}: {}", fingerprint, e),
            }
        }

        let counts = self.vision.score_image(image, filename).await?;
        let counts = match &self.replacer {
            Some(replacer) => {
                let (counts, introduced) = replacer.replace_inactive(counts).await?;
                self.ancestry.top_up(&introduced).await;
                counts
            }
            None => counts,
        };

        // The vision model never emits zeros, but substitution can.
        let mut scores: Vec<TaxonCount> =
            counts.into_iter().filter(|c| c.count > 0.0).collect();

        if let Some(scope) = request.taxon_id {
            if !self.ancestry.knows(scope) {
                info!("unknown taxon scope {}, returning no results", scope);
                return Ok(ScoreResponse::empty());
            }
            scores.retain(|s| self.ancestry.is_descendant(scope, s.taxon_id));
        }
        if scores.is_empty() {
            return Ok(ScoreResponse::empty());
        }

        scores.sort_by(|a, b| {
            b.count
                .partial_cmp(&a.count)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        normalize(&mut scores, 100.0);

        let common_ancestor = if request.flags.skip_frequencies {
            None
        } else {
            self.common_ancestor(request, &scores).await?
        };
        let ancestor_id = common_ancestor.as_ref().map(|ca| ca.taxon.id);

        let candidate_ids: Vec<u32> = scores.iter().map(|s| s.taxon_id).collect();
        let nearby = if request.flags.skip_frequencies {
            None
        } else {
            match self.frequency_source(request) {
                Some(source) => source.fetch(request, &candidate_ids, ancestor_id).await?,
                None => None,
            }
        };
        if let Some(nearby) = &nearby {
            let nearby_ids: Vec<u32> = nearby.iter().map(|r| r.taxon_id).collect();
            self.ancestry.top_up(&nearby_ids).await;
        }

        let combined = blend(
            &scores,
            nearby.as_deref(),
            ancestor_id,
            &self.ancestry,
            &request.flags,
            request.per_page(),
        );

        let response = ScoreResponse {
            results: self.hydrate_results(&combined, &request.locale).await?,
            common_ancestor: self
                .refresh_common_ancestor(common_ancestor, &request.locale)
                .await?,
        };

        if let Ok(bytes) = serde_json::to_vec(&response) {
            self.cache.put(&fingerprint, bytes);
        }
        Ok(response)
    }

    /// Infer a common ancestor from the top window of candidates. The window
    /// is hydrated (with per-taxon memoization) so each candidate carries its
    /// full ancestor chain and rank metadata.
    async fn common_ancestor(
        &self,
        request: &ScoreRequest,
        scores: &[TaxonCount],
    ) -> Result<Option<CommonAncestor>> {
        let window = request
            .ancestor_window
            .unwrap_or(self.scoring.ancestor_window);
        let top: Vec<&TaxonCount> = scores.iter().take(window).collect();
        let ids: Vec<u32> = top.iter().map(|s| s.taxon_id).collect();
        let taxa = self.resolve_taxa(&ids, &request.locale).await?;

        let candidates: Vec<ScoredTaxon> = top
            .iter()
            .filter_map(|s| {
                taxa.get(&s.taxon_id).map(|taxon| ScoredTaxon {
                    taxon: taxon.clone(),
                    vision_score: s.count,
                })
            })
            .collect();

        let resolver = CommonAncestorResolver::new(
            window,
            request
                .ancestor_threshold
                .unwrap_or(self.scoring.ancestor_threshold),
            request
                .rank_level_cutoff
                .unwrap_or(self.scoring.rank_level_cutoff),
        );
        let ancestor = resolver.resolve(&candidates);
        match ancestor {
            Some(ca) if self.scoring.blocked_ancestor_ids.contains(&ca.taxon.id) => {
                debug!("suppressing blocked common ancestor {}", ca.taxon.id);
                Ok(None)
            }
            other => Ok(other),
        }
    }

    fn frequency_source(&self, request: &ScoreRequest) -> Option<FrequencySource> {
        let want_cells = request.flags.cell_frequencies
            || self.default_backend == FrequencyBackend::Cells;
        if want_cells {
            if let Some(store) = &self.cell_store {
                return Some(FrequencySource::Cells(store.clone()));
            }
        }
        self.observation_store
            .as_ref()
            .map(|store| FrequencySource::Observations(store.clone()))
    }

    async fn hydrate_results(
        &self,
        combined: &[CombinedScore],
        locale: &LocaleOptions,
    ) -> Result<Vec<ScoredResult>> {
        let ids: Vec<u32> = combined.iter().map(|s| s.taxon_id).collect();
        let taxa = self.resolve_taxa(&ids, locale).await?;
        Ok(combined
            .iter()
            .filter_map(|s| match taxa.get(&s.taxon_id) {
                Some(taxon) => Some(ScoredResult {
                    taxon: taxon.clone(),
                    combined_score: s.combined_score,
                    frequency_score: s.frequency_score,
                    vision_score: s.vision_score,
                }),
                None => {
                    warn!("dropping unresolvable taxon {}", s.taxon_id);
                    None
                }
            })
            .collect())
    }

    /// The resolver may have landed on an ancestor stub without names or
    /// photos; reload the full record before reporting it.
    async fn refresh_common_ancestor(
        &self,
        ancestor: Option<CommonAncestor>,
        locale: &LocaleOptions,
    ) -> Result<Option<CommonAncestor>> {
        let Some(mut ancestor) = ancestor else {
            return Ok(None);
        };
        let taxa = self.resolve_taxa(&[ancestor.taxon.id], locale).await?;
        if let Some(taxon) = taxa.get(&ancestor.taxon.id) {
            ancestor.taxon = taxon.clone();
        }
        Ok(Some(ancestor))
    }

    /// Resolve taxon details with at-most-once-per-key memoization: cached
    /// records are served from `taxon_{id}` entries, the rest go to the
    /// detail collaborator in one batch and are written back fire-and-forget.
    async fn resolve_taxa(
        &self,
        ids: &[u32],
        locale: &LocaleOptions,
    ) -> Result<HashMap<u32, Taxon>> {
        let mut resolved = HashMap::new();
        let mut to_lookup = Vec::new();
        for id in ids {
            let key = format!("taxon_{}", id);
            match self.cache.get(&key) {
                Some(bytes) => match serde_json::from_slice::<Taxon>(&bytes) {
                    Ok(taxon) => {
                        resolved.insert(*id, taxon);
                    }
                    Err(_) => to_lookup.push(*id),
                },
                None => to_lookup.push(*id),
            }
        }
        if to_lookup.is_empty() {
            return Ok(resolved);
        }

        debug!(
            "hydrating {} taxa ({} cached)",
            to_lookup.len(),
            resolved.len()
        );
        for taxon in self.taxa.resolve(&to_lookup, locale).await? {
            if let Ok(bytes) = serde_json::to_vec(&taxon) {
                self.cache.put(&format!("taxon_{}", taxon.id), bytes);
            }
            resolved.insert(taxon.id, taxon);
        }
        Ok(resolved)
    }
}
