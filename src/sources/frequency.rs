/// Nearby-observation frequency strategies.
///
/// Two interchangeable backends satisfy the same contract: turn a request
/// location, a taxon scope, and a date window into per-taxon observation
/// counts. The observation-search backend aggregates live observations within
/// a bounding radius and date window; the cell backend reads a precomputed
/// grid keyed by 2-degree cell and month.
use chrono::{Datelike, NaiveDate};
use std::sync::Arc;
use tracing::debug;

use super::{CellStore, ObservationStore, TaxonCount};
use crate::core::request::ScoreRequest;
use crate::Result;

pub const DEFAULT_RADIUS_KM: f64 = 100.0;
pub const DEFAULT_WINDOW_DAYS: i64 = 45;

/// Query against the observation search index. Implementations are expected
/// to count research-grade observations of active taxa only.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationQuery {
    pub lat: f64,
    pub lng: f64,
    pub radius_km: f64,
    /// Any-of taxon filter: the scored candidates plus the common ancestor.
    pub taxon_ids: Vec<u32>,
    pub observed_after: Option<NaiveDate>,
    pub observed_before: Option<NaiveDate>,
    /// The observation being scored must not count toward its own prior.
    pub exclude_observation_id: Option<u64>,
}

/// Query against the precomputed frequency-cell grid.
#[derive(Debug, Clone, PartialEq)]
pub struct CellQuery {
    /// South-west corner of a 2-degree cell box.
    pub swlat: i32,
    pub swlng: i32,
    pub taxon_ids: Vec<u32>,
    /// Restrict to the descendant subtree of this taxon, when present.
    pub ancestor_scope: Option<u32>,
    /// 1-based months to include; empty means all months.
    pub months: Vec<u32>,
}

/// A frequency backend selected once per request.
#[derive(Clone)]
pub enum FrequencySource {
    Observations(Arc<dyn ObservationStore>),
    Cells(Arc<dyn CellStore>),
}

impl FrequencySource {
    /// Fetch nearby observation counts for the given candidates. Returns
    /// `None` when the request carries no location, which downstream treats
    /// as "no frequency data available" rather than an error.
    pub async fn fetch(
        &self,
        request: &ScoreRequest,
        candidate_ids: &[u32],
        common_ancestor_id: Option<u32>,
    ) -> Result<Option<Vec<TaxonCount>>> {
        let (Some(lat), Some(lng)) = (request.lat, request.lng) else {
            return Ok(None);
        };
        let counts = match self {
            FrequencySource::Observations(store) => {
                let query = observation_query(request, lat, lng, candidate_ids, common_ancestor_id);
                debug!(
                    "fetching nearby frequencies for {} taxa within {} km",
                    query.taxon_ids.len(),
                    query.radius_km
                );
                store.species_counts(&query).await?
            }
            FrequencySource::Cells(store) => {
                let query = cell_query(request, lat, lng, candidate_ids, common_ancestor_id);
                debug!(
                    "fetching cell frequencies at ({}, {}) for {} months",
                    query.swlat,
                    query.swlng,
                    query.months.len()
                );
                store.cell_counts(&query).await?
            }
        };
        Ok(Some(counts))
    }
}

fn observation_query(
    request: &ScoreRequest,
    lat: f64,
    lng: f64,
    candidate_ids: &[u32],
    common_ancestor_id: Option<u32>,
) -> ObservationQuery {
    let mut taxon_ids = Vec::with_capacity(candidate_ids.len() + 1);
    if let Some(ancestor_id) = common_ancestor_id {
        taxon_ids.push(ancestor_id);
    }
    taxon_ids.extend_from_slice(candidate_ids);

    let window = request.window_days.unwrap_or(DEFAULT_WINDOW_DAYS);
    let (observed_after, observed_before) = match request.observed_on {
        Some(date) => (
            date.checked_sub_days(chrono::Days::new(window as u64)),
            date.checked_add_days(chrono::Days::new(window as u64)),
        ),
        None => (None, None),
    };

    ObservationQuery {
        lat,
        lng,
        radius_km: request.radius.unwrap_or(DEFAULT_RADIUS_KM),
        taxon_ids,
        observed_after,
        observed_before,
        exclude_observation_id: request.observation_id,
    }
}

fn cell_query(
    request: &ScoreRequest,
    lat: f64,
    lng: f64,
    candidate_ids: &[u32],
    common_ancestor_id: Option<u32>,
) -> CellQuery {
    CellQuery {
        swlat: clamp_corner(lat, -90, 88),
        swlng: clamp_corner(lng, -180, 178),
        taxon_ids: candidate_ids.to_vec(),
        ancestor_scope: common_ancestor_id,
        months: request.observed_on.map(month_bucket).unwrap_or_default(),
    }
}

/// South-west corner of the 2-degree cell box centered on the coordinate.
fn clamp_corner(coord: f64, min: i32, max: i32) -> i32 {
    ((coord - 0.5).floor() as i32).clamp(min, max)
}

/// The observation month plus its neighbors, with 1-12 wraparound.
fn month_bucket(date: NaiveDate) -> Vec<u32> {
    let month = date.month();
    let before = if month == 1 { 12 } else { month - 1 };
    let after = if month == 12 { 1 } else { month + 1 };
    vec![before, month, after]
}
