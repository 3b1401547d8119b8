/// Command-line interface: score a local image against a configured vision
/// model, with the taxonomy loaded from a taxa metadata export. Frequency
/// backends are service-side collaborators and are not wired here, so CLI
/// scoring runs in the vision-only degraded mode.
use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::core::config::Config;
use crate::core::engine::ScoreEngine;
use crate::core::request::ScoreRequest;
use crate::sources::{FileTaxonSource, VisionClient};
use crate::storage::ResultCache;
use crate::taxonomy::AncestryIndex;

#[derive(Parser)]
#[command(
    name = "taxavision",
    about = "Vision score fusion and common-ancestor inference",
    version
)]
pub struct Cli {
    /// Increase output verbosity
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Score an image and print the ranked candidate taxa
    Score(ScoreArgs),
    /// Write a default configuration file
    Init(InitArgs),
}

#[derive(Args)]
pub struct ScoreArgs {
    /// Image file to score
    pub image: PathBuf,

    /// Configuration file (defaults to taxavision.toml when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Observation latitude
    #[arg(long)]
    pub lat: Option<f64>,

    /// Observation longitude
    #[arg(long)]
    pub lng: Option<f64>,

    /// Observation date (YYYY-MM-DD)
    #[arg(long)]
    pub observed_on: Option<NaiveDate>,

    /// Restrict candidates to this taxon's descendants
    #[arg(long)]
    pub taxon_id: Option<u32>,

    /// Number of results to return
    #[arg(long)]
    pub per_page: Option<usize>,
}

#[derive(Args)]
pub struct InitArgs {
    /// Where to write the configuration file
    #[arg(default_value = "taxavision.toml")]
    pub path: PathBuf,
}

pub async fn run_score(args: ScoreArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let Some(taxa_file) = &config.taxonomy.taxa_file else {
        bail!("taxonomy.taxa_file must be set to score from the command line");
    };
    let taxa = Arc::new(
        FileTaxonSource::load(taxa_file)
            .with_context(|| format!("loading taxa file {}", taxa_file.display()))?,
    );

    let ancestry = Arc::new(AncestryIndex::new(taxa.clone()));
    ancestry.load(&taxa.taxon_ids()).await;

    let vision = Arc::new(VisionClient::new(
        &config.vision.url,
        Duration::from_secs(config.vision.timeout_secs),
    )?);
    let cache = Arc::new(ResultCache::new(&config.cache.dir));
    let engine = ScoreEngine::new(ancestry, cache, vision, taxa)
        .with_scoring(config.scoring.clone());

    let request = ScoreRequest {
        lat: args.lat,
        lng: args.lng,
        observed_on: args.observed_on,
        taxon_id: args.taxon_id,
        per_page: args.per_page,
        ..Default::default()
    };
    let image = std::fs::read(&args.image)
        .with_context(|| format!("reading image {}", args.image.display()))?;
    let filename = args
        .image
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image.jpg".to_string());

    let response = engine.score_image(&request, image, &filename).await?;

    if let Some(ancestor) = &response.common_ancestor {
        println!(
            "{} {} ({}, score {:.1})",
            "Common ancestor:".bold(),
            ancestor.taxon.name.green(),
            ancestor.taxon.rank,
            ancestor.score
        );
    }
    if response.results.is_empty() {
        println!("No scorable taxa.");
        return Ok(());
    }
    for (i, result) in response.results.iter().enumerate() {
        println!(
            "{:>3}. {:<40} {:>8} {:>10.3}",
            i + 1,
            result.taxon.name,
            result.taxon.rank,
            result.combined_score
        );
    }
    Ok(())
}

pub fn run_init(args: InitArgs) -> anyhow::Result<()> {
    let config = Config::default();
    config.save(&args.path)?;
    println!("Wrote {}", args.path.display());
    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Ok(Config::from_file(path)?),
        None => {
            let default_path = std::path::Path::new("taxavision.toml");
            if default_path.exists() {
                Ok(Config::from_file(default_path)?)
            } else {
                Ok(Config::default())
            }
        }
    }
}
