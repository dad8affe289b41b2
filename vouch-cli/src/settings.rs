//! Settings file

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use vouch_engine::{EngineConfig, TrainerConfig};
use vouch_runtime::{RecommenderConfig, RuntimeConfig};
use vouch_store::StoreConfig;

/// Every tunable, one TOML table per component
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub store: StoreConfig,
    pub trainer: TrainerConfig,
    pub engine: EngineConfig,
    pub runtime: RuntimeConfig,
}

impl Settings {
    /// Load from `path`, or defaults when no file is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content)?;
        settings.trainer.validate()?;
        Ok(settings)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn recommender(&self) -> RecommenderConfig {
        RecommenderConfig {
            trainer: self.trainer.clone(),
            engine: self.engine.clone(),
            runtime: self.runtime.clone(),
        }
    }
}
