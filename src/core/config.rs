use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::scoring::common_ancestor::{
    DEFAULT_ANCESTOR_THRESHOLD, DEFAULT_ANCESTOR_WINDOW, DEFAULT_RANK_LEVEL_CUTOFF,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub vision: VisionConfig,
    pub taxonomy: TaxonomyConfig,
    pub frequency: FrequencyConfig,
    pub scoring: ScoringConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    /// URL of the vision model scoring endpoint
    pub url: String,
    /// Overall timeout for one scoring call, in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonomyConfig {
    /// Taxa metadata export used for the bulk startup load (and as the
    /// detail source where no live service is wired)
    pub taxa_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrequencyBackend {
    Observations,
    Cells,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrequencyConfig {
    /// Default backend; a request can still select the cell backend
    pub backend: FrequencyBackend,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub ancestor_window: usize,
    pub ancestor_threshold: f64,
    pub rank_level_cutoff: f32,
    /// Taxa never reported as a common ancestor
    pub blocked_ancestor_ids: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vision: VisionConfig {
                url: "http://localhost:6006/".to_string(),
                timeout_secs: 5,
            },
            taxonomy: TaxonomyConfig { taxa_file: None },
            frequency: FrequencyConfig {
                backend: FrequencyBackend::Observations,
            },
            scoring: ScoringConfig::default(),
            cache: CacheConfig {
                dir: PathBuf::from(".taxavision/cache"),
            },
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            ancestor_window: DEFAULT_ANCESTOR_WINDOW,
            ancestor_threshold: DEFAULT_ANCESTOR_THRESHOLD,
            rank_level_cutoff: DEFAULT_RANK_LEVEL_CUTOFF,
            blocked_ancestor_ids: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| crate::TaxavisionError::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| crate::TaxavisionError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}
