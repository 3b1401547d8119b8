/// In-process ancestor/descendant index over the taxonomic tree.
///
/// Populated in bulk at startup and topped up incrementally as scoring
/// introduces previously unseen taxa. The index is an optimization, not a
/// correctness requirement: a lookup failure against the backing store leaves
/// the index partial and downstream filtering treats missing taxa as unknown.
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::sources::{AncestrySource, AncestryRow};

/// Backing-store queries are chunked so a bulk startup load of the full
/// model taxonomy does not produce oversized queries.
const LOAD_CHUNK_SIZE: usize = 500;

pub struct AncestryIndex {
    source: Arc<dyn AncestrySource>,
    /// taxon id -> ancestor chain, root-first, excluding the taxon itself
    ancestries: DashMap<u32, Vec<u32>>,
    /// taxon id -> descendant closure, including the taxon itself
    descendants: DashMap<u32, HashSet<u32>>,
    /// Serializes all writers so concurrent top-ups never interleave
    /// partial updates for the same taxon.
    write_lock: Mutex<()>,
}

impl AncestryIndex {
    pub fn new(source: Arc<dyn AncestrySource>) -> Self {
        Self {
            source,
            ancestries: DashMap::new(),
            descendants: DashMap::new(),
            write_lock: Mutex::new(()),
        }
    }

    /// Bulk-load ancestry chains for the given taxa. Store failures are
    /// logged and swallowed; a partial index is an acceptable degraded state.
    pub async fn load(&self, taxon_ids: &[u32]) {
        if taxon_ids.is_empty() {
            return;
        }
        for chunk in taxon_ids.chunks(LOAD_CHUNK_SIZE) {
            match self.source.ancestries(chunk).await {
                Ok(rows) => self.ingest(rows),
                Err(e) => {
                    warn!("ancestry lookup failed for {} taxa: {}", chunk.len(), e);
                }
            }
        }
    }

    /// Load only taxa the index has not seen yet. Called whenever blending
    /// or inactive-taxon substitution introduces new taxon ids.
    pub async fn top_up(&self, taxon_ids: &[u32]) {
        let missing: Vec<u32> = taxon_ids
            .iter()
            .copied()
            .filter(|id| !self.has_entry(*id))
            .collect();
        if missing.is_empty() {
            return;
        }
        debug!("topping up ancestry index with {} taxa", missing.len());
        self.load(&missing).await;
    }

    fn ingest(&self, rows: Vec<AncestryRow>) {
        let _guard = self.write_lock.lock();
        for row in rows {
            let ancestors = match parse_ancestry(row.ancestry.as_deref()) {
                Ok(a) => a,
                Err(segment) => {
                    warn!(
                        "rejecting taxon {}: malformed ancestry segment {:?}",
                        row.id, segment
                    );
                    continue;
                }
            };
            // Publish descendant sets first and the chain entry last, so a
            // taxon with a visible chain always has a complete closure.
            self.descendants.entry(row.id).or_default().insert(row.id);
            for ancestor_id in &ancestors {
                self.descendants
                    .entry(*ancestor_id)
                    .or_default()
                    .insert(row.id);
            }
            self.ancestries.insert(row.id, ancestors);
        }
    }

    /// True if `taxon_id` is in the descendant closure of `ancestor_id`,
    /// including `taxon_id == ancestor_id` when that taxon is indexed.
    pub fn is_descendant(&self, ancestor_id: u32, taxon_id: u32) -> bool {
        self.descendants
            .get(&ancestor_id)
            .map(|set| set.contains(&taxon_id))
            .unwrap_or(false)
    }

    /// True if the given ancestor is known to the index at all. An unknown
    /// taxon-scope constraint filters everything out rather than erroring.
    pub fn knows(&self, taxon_id: u32) -> bool {
        self.descendants.contains_key(&taxon_id)
    }

    pub fn has_entry(&self, taxon_id: u32) -> bool {
        self.ancestries.contains_key(&taxon_id)
    }

    pub fn len(&self) -> usize {
        self.ancestries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ancestries.is_empty()
    }
}

/// Parse a delimited root-to-parent chain like `"48460/47126/4"`. An absent
/// chain means a root taxon. A non-numeric segment rejects the whole row.
fn parse_ancestry(ancestry: Option<&str>) -> std::result::Result<Vec<u32>, String> {
    let Some(raw) = ancestry else {
        return Ok(Vec::new());
    };
    raw.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<u32>().map_err(|_| s.to_string()))
        .collect()
}
