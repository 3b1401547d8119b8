use clap::Parser;
use colored::*;
use std::process;
use taxavision::cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize logging with TAXAVISION_LOG environment variable support
    let log_level = std::env::var("TAXAVISION_LOG").unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level)),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "Error:".red().bold(), e);

        // Use appropriate exit codes based on error type
        let exit_code = match e.downcast_ref::<taxavision::TaxavisionError>() {
            Some(taxavision::TaxavisionError::Config(_)) => 2,
            Some(taxavision::TaxavisionError::Io(_)) => 3,
            Some(taxavision::TaxavisionError::Scoring(_))
            | Some(taxavision::TaxavisionError::Parse(_)) => 4,
            Some(taxavision::TaxavisionError::Http(_))
            | Some(taxavision::TaxavisionError::Upstream(_)) => 5,
            _ => 1,
        };
        process::exit(exit_code);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Score(args) => taxavision::cli::run_score(args).await,
        Commands::Init(args) => taxavision::cli::run_init(args),
    }
}
