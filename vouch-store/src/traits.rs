//! Interfaces consumed by the trainer and the recommendation engine

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use vouch_core::{
    CategoryId, Connection, FeedItem, ItemId, Judgment, Polarity, PriorJudgment, Rating,
    Recommendation, Source, SourceType, Subscription, TimePeriod,
};

use crate::StoreError;

/// A single connection weight write
#[derive(Debug, Clone, PartialEq)]
pub struct WeightWrite {
    pub subscriber: Source,
    pub publisher: Source,
    pub polarity: Polarity,
    pub weight: f64,
    /// Set when both sides endorsed this item
    pub shared_item: Option<ItemId>,
    /// Set when the write is a decay caused by the publisher's new content
    pub publisher_voted: bool,
}

impl WeightWrite {
    pub fn new(subscriber: Source, publisher: Source, polarity: Polarity, weight: f64) -> Self {
        Self {
            subscriber,
            publisher,
            polarity,
            weight,
            shared_item: None,
            publisher_voted: false,
        }
    }

    pub fn with_shared_item(mut self, item: Option<ItemId>) -> Self {
        self.shared_item = item;
        self
    }

    pub fn publisher_voted(mut self) -> Self {
        self.publisher_voted = true;
        self
    }
}

/// Persistence of trust records, as the trainer sees it
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Current weight, 0 when no record exists
    async fn get_weight(
        &self,
        subscriber: &Source,
        publisher: &Source,
        polarity: Polarity,
    ) -> Result<f64, StoreError>;

    /// Write a weight, creating the record on first write
    async fn set_weight(&self, write: WeightWrite) -> Result<(), StoreError>;

    /// Earlier judges of `item`, most recent first, excluding `subscriber`
    async fn prior_judgments(
        &self,
        item: ItemId,
        subscriber: &Source,
        rating: Rating,
    ) -> Result<Vec<PriorJudgment>, StoreError>;

    /// Everyone holding a connection of `polarity` to `publisher`
    async fn subscribers(
        &self,
        publisher: &Source,
        polarity: Polarity,
    ) -> Result<Vec<Subscription>, StoreError>;

    /// Whether `source` may hold connections at all
    fn can_subscribe(&self, source: &Source) -> bool {
        let _ = source;
        true
    }
}

/// Selection of a subscriber's strongest connections
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionQuery {
    pub subscriber_id: String,
    pub publisher_type: SourceType,
    pub version: String,
    /// `None` matches every subscriber category
    pub subscriber_category: Option<Option<CategoryId>>,
    /// Keep only connections whose publisher was active within this many days
    pub active_within_days: Option<u32>,
    /// Keep only positive connections with weight > 0
    pub positive_only: bool,
    pub limit: usize,
}

/// Selection of recent judgments by everyone
#[derive(Debug, Clone, PartialEq)]
pub struct JudgmentQuery {
    /// Exclusive lower bound on the judgment time
    pub since: Option<DateTime<Utc>>,
    pub limit: usize,
}

/// Candidate sources for the recommendation engine
#[async_trait]
pub trait CandidateProvider: Send + Sync {
    /// Strongest connections first
    async fn top_connections(&self, query: &ConnectionQuery) -> Result<Vec<Connection>, StoreError>;

    /// Judgments by all sources, newest first
    async fn recent_judgments(&self, query: &JudgmentQuery) -> Result<Vec<Judgment>, StoreError>;

    /// Items published by any of `feed_urls` after `since`
    async fn feed_items(
        &self,
        feed_urls: &[String],
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<FeedItem>, StoreError>;

    /// Items the user has recently judged, whatever the rating
    async fn rated_item_ids(&self, user_id: &str) -> Result<HashSet<ItemId>, StoreError>;
}

/// Stable item id <-> canonical url mapping
#[async_trait]
pub trait ItemResolver: Send + Sync {
    /// Existing id for `url`, allocating one if needed
    async fn item_id(&self, url: &str) -> Result<ItemId, StoreError>;

    /// Ids of the urls that are already known
    async fn item_ids(&self, urls: &[String]) -> Result<HashMap<String, ItemId>, StoreError>;

    async fn item_urls(&self, items: &[ItemId]) -> Result<HashMap<ItemId, String>, StoreError>;
}

/// Per-user category lookup
#[async_trait]
pub trait CategoryDirectory: Send + Sync {
    async fn category_exists(&self, user_id: &str, category: CategoryId) -> Result<bool, StoreError>;
}

/// Summary of one committed batch of past recommendations
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub user_id: String,
    pub time_period: TimePeriod,
    pub session_number: u32,
    pub recommendation_count: usize,
    pub median_weight: f64,
    pub min_weight: f64,
    pub max_weight: f64,
}

/// Previously shown recommendations, excluded from later requests
#[async_trait]
pub trait PastRecommendationStore: Send + Sync {
    /// Store a page of shown recommendations as uncommitted
    async fn save_past_recommendations(
        &self,
        user_id: &str,
        period: TimePeriod,
        recommendations: &[Recommendation],
        saved_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Commit everything saved up to `saved_at` unless a newer save exists
    async fn commit_past_recommendations(
        &self,
        user_id: &str,
        period: TimePeriod,
        saved_at: DateTime<Utc>,
    ) -> Result<Option<SessionSummary>, StoreError>;

    /// Committed item ids for one period, or for all periods when `None`
    async fn past_recommendation_ids(
        &self,
        user_id: &str,
        period: Option<TimePeriod>,
    ) -> Result<HashSet<ItemId>, StoreError>;
}

/// Where new judgments and feed publications land
#[async_trait]
pub trait JudgmentLog: Send + Sync {
    /// Record a judgment, replacing the source's earlier judgment of the item
    async fn record_judgment(&self, judgment: Judgment) -> Result<(), StoreError>;

    async fn current_judgment(&self, user_id: &str, item: ItemId) -> Result<Option<Judgment>, StoreError>;

    /// Register items published by a feed; returns how many were new
    async fn record_feed_items(
        &self,
        feed_url: &str,
        items: &[ItemId],
        published_at: DateTime<Utc>,
    ) -> Result<usize, StoreError>;
}

/// Everything the recommendation engine reads, behind one handle
pub trait RecommendationBackend:
    CandidateProvider + ItemResolver + CategoryDirectory + PastRecommendationStore
{
}

impl<T> RecommendationBackend for T where
    T: CandidateProvider + ItemResolver + CategoryDirectory + PastRecommendationStore
{
}

/// Thread-safe reference to a connection store
pub type SharedConnectionStore = Arc<dyn ConnectionStore>;

/// Thread-safe reference to the engine's backend
pub type SharedBackend = Arc<dyn RecommendationBackend>;

/// Thread-safe reference to a judgment log
pub type SharedJudgmentLog = Arc<dyn JudgmentLog>;
