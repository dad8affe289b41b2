//! Runtime configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use vouch_engine::{EngineConfig, TrainerConfig};

/// Work queue and scheduling tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Attempts per task, including the first
    pub max_attempts: u32,
    /// Base retry delay, doubled per attempt
    pub retry_backoff_ms: u64,
    /// Upper bound of the random delay added to each retry
    pub retry_jitter_ms: u64,
    /// Delay before a judgment is trained
    pub training_delay_ms: u64,
    /// Delay before shown recommendations are committed as past ones
    pub commit_delay_secs: u64,
    /// Deadline for each store call made by the service and its tasks
    pub store_timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_backoff_ms: 200,
            retry_jitter_ms: 50,
            training_delay_ms: 0,
            commit_delay_secs: 3600,
            store_timeout_ms: 2000,
        }
    }
}

impl RuntimeConfig {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_retry_backoff_ms(mut self, ms: u64) -> Self {
        self.retry_backoff_ms = ms;
        self
    }

    pub fn with_retry_jitter_ms(mut self, ms: u64) -> Self {
        self.retry_jitter_ms = ms;
        self
    }

    pub fn with_training_delay_ms(mut self, ms: u64) -> Self {
        self.training_delay_ms = ms;
        self
    }

    pub fn with_commit_delay_secs(mut self, secs: u64) -> Self {
        self.commit_delay_secs = secs;
        self
    }

    pub fn with_store_timeout_ms(mut self, ms: u64) -> Self {
        self.store_timeout_ms = ms;
        self
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn training_delay(&self) -> Duration {
        Duration::from_millis(self.training_delay_ms)
    }

    pub fn commit_delay(&self) -> Duration {
        Duration::from_secs(self.commit_delay_secs)
    }
}

/// Everything a [`crate::Recommender`] is tuned by
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommenderConfig {
    pub trainer: TrainerConfig,
    pub engine: EngineConfig,
    pub runtime: RuntimeConfig,
}
