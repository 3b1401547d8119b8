/// File-backed taxon source.
///
/// Parses a taxa metadata export, one taxon per line:
/// `taxon_id<TAB>name<TAB>rank<TAB>rank_level<TAB>ancestry`
/// where ancestry is the `/`-delimited root-to-parent chain (empty for root
/// taxa). Used for the bulk startup load and as a hydration source where no
/// live detail service is wired, e.g. the CLI.
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{info, warn};

use super::{AncestryRow, AncestrySource, LocaleOptions, TaxonSource};
use crate::taxonomy::Taxon;
use crate::{Result, TaxavisionError};

pub struct FileTaxonSource {
    taxa: HashMap<u32, Taxon>,
    ancestries: HashMap<u32, Option<String>>,
}

impl FileTaxonSource {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let reader = BufReader::new(file);
        let mut taxa = HashMap::new();
        let mut ancestries = HashMap::new();

        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match parse_line(&line) {
                Ok((taxon, ancestry)) => {
                    ancestries.insert(taxon.id, ancestry);
                    taxa.insert(taxon.id, taxon);
                }
                Err(e) => {
                    warn!("skipping taxa file line {}: {}", lineno + 1, e);
                }
            }
        }
        info!("loaded {} taxa from file", taxa.len());
        Ok(Self { taxa, ancestries })
    }

    /// Every taxon id in the file, for the bulk ancestry load at startup.
    pub fn taxon_ids(&self) -> Vec<u32> {
        self.taxa.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.taxa.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taxa.is_empty()
    }
}

fn parse_line(line: &str) -> Result<(Taxon, Option<String>)> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 5 {
        return Err(TaxavisionError::Parse(format!(
            "expected 5 tab-separated fields, got {}",
            fields.len()
        )));
    }
    let id = fields[0]
        .parse::<u32>()
        .map_err(|_| TaxavisionError::Parse(format!("bad taxon id {:?}", fields[0])))?;
    let rank_level = fields[3]
        .parse::<f32>()
        .map_err(|_| TaxavisionError::Parse(format!("bad rank level {:?}", fields[3])))?;
    let ancestry = fields[4].trim();
    let ancestor_ids = if ancestry.is_empty() {
        Vec::new()
    } else {
        ancestry
            .split('/')
            .map(|s| {
                s.parse::<u32>()
                    .map_err(|_| TaxavisionError::Parse(format!("bad ancestry segment {:?}", s)))
            })
            .collect::<Result<Vec<u32>>>()?
    };

    let taxon = Taxon {
        id,
        name: fields[1].to_string(),
        rank: fields[2].to_string(),
        rank_level,
        ancestor_ids,
        ancestors: Vec::new(),
        is_active: true,
    };
    let ancestry = if ancestry.is_empty() {
        None
    } else {
        Some(ancestry.to_string())
    };
    Ok((taxon, ancestry))
}

#[async_trait]
impl AncestrySource for FileTaxonSource {
    async fn ancestries(&self, taxon_ids: &[u32]) -> Result<Vec<AncestryRow>> {
        Ok(taxon_ids
            .iter()
            .filter_map(|id| {
                self.ancestries.get(id).map(|ancestry| AncestryRow {
                    id: *id,
                    ancestry: ancestry.clone(),
                })
            })
            .collect())
    }
}

#[async_trait]
impl TaxonSource for FileTaxonSource {
    async fn resolve(&self, taxon_ids: &[u32], _locale: &LocaleOptions) -> Result<Vec<Taxon>> {
        Ok(taxon_ids
            .iter()
            .filter_map(|id| self.taxa.get(id))
            .map(|base| {
                let mut taxon = base.clone();
                taxon.ancestors = base
                    .ancestor_ids
                    .iter()
                    .filter_map(|aid| self.taxa.get(aid).cloned())
                    .collect();
                taxon
            })
            .collect())
    }
}
