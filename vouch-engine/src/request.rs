//! Recommendation request parameters

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use vouch_core::{
    validate_identifier, CategoryId, Connection, TimePeriod, ValidationError,
    LOGISTIC_REGRESSION_CONNECTION,
};

/// Which candidate streams a request draws from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTypeFilter {
    #[default]
    Any,
    User,
    Feed,
}

impl SourceTypeFilter {
    pub fn includes_users(&self) -> bool {
        !matches!(self, SourceTypeFilter::Feed)
    }

    pub fn includes_feeds(&self) -> bool {
        !matches!(self, SourceTypeFilter::User)
    }
}

impl fmt::Display for SourceTypeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SourceTypeFilter::Any => "any",
            SourceTypeFilter::User => "user",
            SourceTypeFilter::Feed => "feed",
        })
    }
}

impl FromStr for SourceTypeFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "any" => Ok(SourceTypeFilter::Any),
            "user" => Ok(SourceTypeFilter::User),
            "feed" => Ok(SourceTypeFilter::Feed),
            other => Err(format!("unknown source type: {}", other)),
        }
    }
}

/// A request for on-demand recommendations
#[derive(Debug, Clone, PartialEq)]
pub struct RecommendationRequest {
    pub subscriber: String,
    pub time_period: TimePeriod,
    pub category: Option<CategoryId>,
    /// Use connections from every subscriber category
    pub any_category: bool,
    /// Give every endorsement a small constant weight, connected or not
    pub include_popular: bool,
    pub limit: usize,
    pub connection_version: String,
    /// Multiplier applied per older item from the same source, in (0, 1]
    pub decay_rate: f64,
    pub source_type: SourceTypeFilter,
    pub exclude_urls: Vec<String>,
    pub save_past_recommendations: bool,
    pub exclude_past_recommendations: bool,
    pub exclude_past_recommendations_from_all_time_periods: bool,
    /// Replace the stored connections of the subscriber
    pub external_connections: Option<Vec<Connection>>,
    pub exclude_rated_items: bool,
    /// Keep recommendations from the same connections apart
    pub diversify: bool,
}

impl RecommendationRequest {
    pub fn new(subscriber: impl Into<String>) -> Self {
        Self {
            subscriber: subscriber.into(),
            time_period: TimePeriod::Day,
            category: None,
            any_category: false,
            include_popular: false,
            limit: 20,
            connection_version: LOGISTIC_REGRESSION_CONNECTION.to_string(),
            decay_rate: 1.0,
            source_type: SourceTypeFilter::Any,
            exclude_urls: Vec::new(),
            save_past_recommendations: false,
            exclude_past_recommendations: false,
            exclude_past_recommendations_from_all_time_periods: false,
            external_connections: None,
            exclude_rated_items: true,
            diversify: false,
        }
    }

    pub fn with_time_period(mut self, period: TimePeriod) -> Self {
        self.time_period = period;
        self
    }

    pub fn with_category(mut self, category: Option<CategoryId>) -> Self {
        self.category = category;
        self
    }

    pub fn any_category(mut self) -> Self {
        self.any_category = true;
        self
    }

    pub fn include_popular(mut self) -> Self {
        self.include_popular = true;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_connection_version(mut self, version: &str) -> Self {
        self.connection_version = version.to_string();
        self
    }

    pub fn with_decay_rate(mut self, rate: f64) -> Self {
        self.decay_rate = rate;
        self
    }

    pub fn with_source_type(mut self, source_type: SourceTypeFilter) -> Self {
        self.source_type = source_type;
        self
    }

    pub fn excluding_urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_urls.extend(urls.into_iter().map(Into::into));
        self
    }

    pub fn save_past_recommendations(mut self) -> Self {
        self.save_past_recommendations = true;
        self
    }

    pub fn exclude_past_recommendations(mut self, from_all_time_periods: bool) -> Self {
        self.exclude_past_recommendations = true;
        self.exclude_past_recommendations_from_all_time_periods = from_all_time_periods;
        self
    }

    pub fn with_external_connections(mut self, connections: Vec<Connection>) -> Self {
        self.external_connections = Some(connections);
        self
    }

    pub fn including_rated_items(mut self) -> Self {
        self.exclude_rated_items = false;
        self
    }

    pub fn diversify(mut self) -> Self {
        self.diversify = true;
        self
    }

    /// Subscriber category filter for connection lookups; `None` means any
    pub fn subscriber_category(&self) -> Option<Option<CategoryId>> {
        if self.any_category {
            None
        } else {
            Some(self.category)
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_identifier(&self.subscriber)?;
        if self.limit == 0 {
            return Err(ValidationError::InvalidLimit);
        }
        if !(self.decay_rate > 0.0 && self.decay_rate <= 1.0) {
            return Err(ValidationError::InvalidDecayRate(self.decay_rate));
        }
        validate_identifier(&self.connection_version)?;
        for url in &self.exclude_urls {
            validate_identifier(url)?;
        }
        Ok(())
    }
}
