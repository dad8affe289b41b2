//! Trainer and engine tunables

use serde::{Deserialize, Serialize};
use std::time::Duration;

use vouch_core::{
    ValidationError, DEFAULT_CONTRIBUTION, DEFAULT_IGNORE_LEARNING_RATE, DEFAULT_LEARNING_RATE,
    MAX_TOP_FEEDS, MAX_TOP_SOURCES, NOMINAL_USER_VOTE_WEIGHT,
};

/// Connection trainer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Step size of the logistic regression update
    pub learning_rate: f64,
    /// How fast unreciprocated items pull weights back to neutral
    pub ignore_learning_rate: f64,
    /// Smoothing floor for each prior judge's share of an update
    pub default_contribution: f64,
    /// Concurrent weight writes during a decay pass
    pub decay_concurrency: usize,
    /// Deadline for each connection store call
    pub store_timeout_ms: u64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            learning_rate: DEFAULT_LEARNING_RATE,
            ignore_learning_rate: DEFAULT_IGNORE_LEARNING_RATE,
            default_contribution: DEFAULT_CONTRIBUTION,
            decay_concurrency: 8,
            store_timeout_ms: 2000,
        }
    }
}

impl TrainerConfig {
    pub fn with_learning_rate(mut self, rate: f64) -> Self {
        self.learning_rate = rate;
        self
    }

    pub fn with_ignore_learning_rate(mut self, rate: f64) -> Self {
        self.ignore_learning_rate = rate;
        self
    }

    pub fn with_default_contribution(mut self, contribution: f64) -> Self {
        self.default_contribution = contribution;
        self
    }

    pub fn with_decay_concurrency(mut self, concurrency: usize) -> Self {
        self.decay_concurrency = concurrency;
        self
    }

    pub fn with_store_timeout_ms(mut self, ms: u64) -> Self {
        self.store_timeout_ms = ms;
        self
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let in_unit_interval = |v: f64| v > 0.0 && v < 1.0;
        if !in_unit_interval(self.learning_rate) {
            return Err(ValidationError::InvalidSetting {
                name: "learning_rate",
                reason: format!("{} is not in (0, 1)", self.learning_rate),
            });
        }
        if !in_unit_interval(self.ignore_learning_rate) {
            return Err(ValidationError::InvalidSetting {
                name: "ignore_learning_rate",
                reason: format!("{} is not in (0, 1)", self.ignore_learning_rate),
            });
        }
        if !(self.default_contribution > 0.0) {
            return Err(ValidationError::InvalidSetting {
                name: "default_contribution",
                reason: "must be positive".to_string(),
            });
        }
        if self.decay_concurrency == 0 {
            return Err(ValidationError::InvalidSetting {
                name: "decay_concurrency",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.store_timeout_ms == 0 {
            return Err(ValidationError::InvalidSetting {
                name: "store_timeout_ms",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Recommendation engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Deadline for each sub-fetch of a request
    pub fetch_timeout_ms: u64,
    /// Strongest user connections loaded per request
    pub max_user_connections: usize,
    /// Strongest feed connections loaded per request
    pub max_feed_connections: usize,
    /// Newest judgments by others considered per request
    pub max_recent_judgments: usize,
    /// Weight of a single endorsement when popular items are requested
    pub nominal_user_vote_weight: f64,
    pub max_top_sources: usize,
    pub max_top_feeds: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: 2000,
            max_user_connections: 100,
            max_feed_connections: 400,
            max_recent_judgments: 1000,
            nominal_user_vote_weight: NOMINAL_USER_VOTE_WEIGHT,
            max_top_sources: MAX_TOP_SOURCES,
            max_top_feeds: MAX_TOP_FEEDS,
        }
    }
}

impl EngineConfig {
    pub fn with_fetch_timeout_ms(mut self, ms: u64) -> Self {
        self.fetch_timeout_ms = ms;
        self
    }

    pub fn with_nominal_user_vote_weight(mut self, weight: f64) -> Self {
        self.nominal_user_vote_weight = weight;
        self
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(TrainerConfig::default().validate().is_ok());
        assert_eq!(EngineConfig::default().max_feed_connections, 400);
    }

    #[test]
    fn test_rejects_out_of_range_rates() {
        let err = TrainerConfig::default()
            .with_learning_rate(1.5)
            .validate()
            .unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidSetting { name: "learning_rate", .. }
        ));
        assert!(TrainerConfig::default()
            .with_default_contribution(0.0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: TrainerConfig = serde_json::from_str(r#"{"learning_rate": 0.05}"#).unwrap();
        assert_eq!(config.learning_rate, 0.05);
        assert_eq!(config.decay_concurrency, 8);
        assert_eq!(config.store_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_rejects_zero_store_timeout() {
        assert!(TrainerConfig::default()
            .with_store_timeout_ms(0)
            .validate()
            .is_err());
    }
}
