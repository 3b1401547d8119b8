pub mod config;
pub mod engine;
pub mod request;

pub use config::Config;
pub use engine::ScoreEngine;
pub use request::{ScoreFlags, ScoreRequest};
