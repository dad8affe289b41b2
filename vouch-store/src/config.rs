//! Store tunables

use chrono::Duration;
use serde::{Deserialize, Serialize};
use vouch_core::{LOGISTIC_REGRESSION_CONNECTION, MAX_TOP_SOURCES};

/// In-memory store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Connection model version new records are written under
    pub connection_version: String,
    /// How far before "now" a new connection's subscription starts
    pub subscription_backdate_hours: i64,
    /// Extra window after the backdated start during which feed decay is ignored
    pub feed_decay_grace_minutes: i64,
    /// Co-endorsed items kept per connection
    pub max_top_sources: usize,
    /// Committed past recommendations kept per exclusion scope
    pub past_recommendations_limit: usize,
    /// Most recent rated items used for "already judged" exclusion
    pub rated_items_limit: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            connection_version: LOGISTIC_REGRESSION_CONNECTION.to_string(),
            subscription_backdate_hours: 24,
            feed_decay_grace_minutes: 60,
            max_top_sources: MAX_TOP_SOURCES,
            past_recommendations_limit: 6000,
            rated_items_limit: 500,
        }
    }
}

impl StoreConfig {
    pub fn subscription_backdate(&self) -> Duration {
        Duration::hours(self.subscription_backdate_hours)
    }

    pub fn feed_decay_grace(&self) -> Duration {
        Duration::minutes(self.feed_decay_grace_minutes)
    }

    pub fn with_connection_version(mut self, version: &str) -> Self {
        self.connection_version = version.to_string();
        self
    }
}
