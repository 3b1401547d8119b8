pub mod cli;
pub mod core;
pub mod scoring;
pub mod sources;
pub mod storage;
pub mod taxonomy;

pub use crate::core::{config::Config, engine::ScoreEngine, request::ScoreRequest};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaxavisionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Error scoring image: {0}")]
    Scoring(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, TaxavisionError>;
