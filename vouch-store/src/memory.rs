//! In-memory backend implementing every store and provider interface
//!
//! Judgments and feed items are kept on a single timeline ordered by
//! (timestamp, insertion sequence), so equal timestamps still have a
//! deterministic order.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::{DashMap, DashSet};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

use vouch_core::{
    CategoryId, Connection, ConnectionKey, FeedItem, ItemId, Judgment, Polarity, PriorJudgment,
    Rating, Recommendation, Source, SourceType, Subscription, TimePeriod,
};

use crate::{
    CandidateProvider, CategoryDirectory, ConnectionQuery, ConnectionStore, ItemRegistry,
    ItemResolver, JudgmentLog, JudgmentQuery, PastRecommendationLog, PastRecommendationStore,
    SessionSummary, SharedClock, StoreConfig, StoreError, SystemClock, WeightWrite,
};

/// Position on the timeline
type Stamp = (DateTime<Utc>, u64);

#[derive(Debug, Default)]
struct Timeline {
    seq: u64,
    judgments: BTreeMap<Stamp, Judgment>,
    /// (user id, item) -> stamp of the user's current judgment
    judgment_index: HashMap<(String, ItemId), Stamp>,
    feed_items: BTreeMap<Stamp, FeedItem>,
    feed_index: HashSet<(String, ItemId)>,
}

impl Timeline {
    fn next_stamp(&mut self, at: DateTime<Utc>) -> Stamp {
        self.seq += 1;
        (at, self.seq)
    }

    /// Judgments (or feed items) `source` made at or after `stamp`
    fn count_since(&self, source: &Source, stamp: Stamp) -> u32 {
        match source.source_type {
            SourceType::User => self
                .judgments
                .range(stamp..)
                .filter(|(_, j)| j.source.id == source.id && j.source.category == source.category)
                .count() as u32,
            SourceType::Feed => self
                .feed_items
                .range(stamp..)
                .filter(|(_, f)| f.feed_url == source.id)
                .count() as u32,
        }
    }

    fn last_activity(&self, source: &Source) -> Option<DateTime<Utc>> {
        match source.source_type {
            SourceType::User => self
                .judgments
                .iter()
                .rev()
                .find(|(_, j)| j.source.id == source.id && j.source.category == source.category)
                .map(|(stamp, _)| stamp.0),
            SourceType::Feed => self
                .feed_items
                .iter()
                .rev()
                .find(|(_, f)| f.feed_url == source.id)
                .map(|(stamp, _)| stamp.0),
        }
    }
}

/// A prior judge before its weight is looked up
struct PriorEntry {
    stamp: Stamp,
    source: Source,
    rating: Rating,
    fixed_ranks: bool,
}

/// In-memory store
pub struct MemoryStore {
    config: StoreConfig,
    clock: SharedClock,
    items: ItemRegistry,
    timeline: RwLock<Timeline>,
    connections: DashMap<ConnectionKey, Connection>,
    feeds: DashSet<String>,
    /// Feed an item declares itself part of (page metadata)
    item_feeds: DashMap<ItemId, String>,
    categories: DashMap<(String, CategoryId), String>,
    next_category: AtomicU64,
    past: PastRecommendationLog,
}

impl MemoryStore {
    pub fn new(config: StoreConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: StoreConfig, clock: SharedClock) -> Self {
        let past = PastRecommendationLog::new(config.past_recommendations_limit);
        Self {
            config,
            clock,
            items: ItemRegistry::new(),
            timeline: RwLock::new(Timeline::default()),
            connections: DashMap::new(),
            feeds: DashSet::new(),
            item_feeds: DashMap::new(),
            categories: DashMap::new(),
            next_category: AtomicU64::new(1),
            past,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn clock(&self) -> SharedClock {
        self.clock.clone()
    }

    pub fn items(&self) -> &ItemRegistry {
        &self.items
    }

    pub fn past_recommendations(&self) -> &PastRecommendationLog {
        &self.past
    }

    /// Create a category owned by `user_id`
    pub fn add_category(&self, user_id: &str, name: &str) -> CategoryId {
        let id = self.next_category.fetch_add(1, Ordering::Relaxed);
        self.categories.insert((user_id.to_string(), id), name.to_string());
        id
    }

    pub fn register_feed(&self, feed_url: &str) {
        self.feeds.insert(feed_url.to_string());
    }

    pub fn is_feed(&self, url: &str) -> bool {
        self.feeds.contains(url)
    }

    /// Record the feed an item's page declares it belongs to
    pub fn set_item_feed(&self, item: ItemId, feed_url: &str) {
        self.register_feed(feed_url);
        self.item_feeds.insert(item, feed_url.to_string());
    }

    pub fn connection(&self, key: &ConnectionKey) -> Option<Connection> {
        self.connections.get(key).map(|c| c.clone())
    }

    /// Every connection a user holds, strongest first
    pub fn connections_of(&self, subscriber_id: &str) -> Vec<Connection> {
        let mut result: Vec<Connection> = self
            .connections
            .iter()
            .filter(|c| c.key.subscriber.id == subscriber_id)
            .map(|c| c.clone())
            .collect();
        result.sort_by(|a, b| b.weight.total_cmp(&a.weight).then_with(|| a.key.cmp(&b.key)));
        result
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn weight_of(&self, subscriber: &Source, publisher: &Source, polarity: Polarity) -> f64 {
        let key = ConnectionKey::new(
            subscriber.clone(),
            publisher.clone(),
            polarity,
            self.config.connection_version.as_str(),
        );
        self.connections.get(&key).map_or(0.0, |c| c.weight)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

#[async_trait]
impl ConnectionStore for MemoryStore {
    async fn get_weight(
        &self,
        subscriber: &Source,
        publisher: &Source,
        polarity: Polarity,
    ) -> Result<f64, StoreError> {
        Ok(self.weight_of(subscriber, publisher, polarity))
    }

    async fn set_weight(&self, write: WeightWrite) -> Result<(), StoreError> {
        // Recommendations are never made to feeds.
        if write.subscriber.is_feed() {
            return Ok(());
        }
        let now = self.clock.now();
        let backdate = self.config.subscription_backdate();
        let last_active = self.timeline.read().last_activity(&write.publisher);

        let key = ConnectionKey::new(
            write.subscriber.clone(),
            write.publisher.clone(),
            write.polarity,
            self.config.connection_version.as_str(),
        );
        let mut entry = self
            .connections
            .entry(key.clone())
            .or_insert_with(|| Connection::new(key, write.weight, now - backdate, last_active, now));
        let connection = entry.value_mut();

        // A freshly subscribed feed's "new" items are usually its initial
        // import, so they must not decay the connection yet.
        let in_grace = write.publisher_voted
            && connection.publisher().is_feed()
            && connection.subscription_start > now - (backdate + self.config.feed_decay_grace());
        if in_grace {
            trace!("Decay of {} suppressed during grace period", connection.key);
        } else {
            connection.weight = write.weight;
        }
        if write.publisher_voted {
            connection.active_at = Some(now);
        }
        if let Some(item) = write.shared_item {
            connection.record_shared_item(item, self.config.max_top_sources);
        }
        connection.updated_at = now;
        Ok(())
    }

    async fn prior_judgments(
        &self,
        item: ItemId,
        subscriber: &Source,
        rating: Rating,
    ) -> Result<Vec<PriorJudgment>, StoreError> {
        let now = self.clock.now();
        let timeline = self.timeline.read();

        let mut merged: Vec<PriorEntry> = timeline
            .judgments
            .iter()
            .filter(|(_, j)| j.item == item && !j.rating.is_neutral())
            .map(|(stamp, j)| PriorEntry {
                stamp: *stamp,
                source: j.source.clone(),
                rating: j.rating,
                fixed_ranks: false,
            })
            .collect();
        merged.extend(
            timeline
                .feed_items
                .iter()
                .filter(|(_, f)| f.item == item)
                .map(|(stamp, f)| PriorEntry {
                    stamp: *stamp,
                    source: Source::feed(f.feed_url.as_str()),
                    rating: Rating::Positive,
                    fixed_ranks: false,
                }),
        );

        // A downvoted page could name any feed in its metadata, so the
        // declared feed is only credited on endorsements.
        if rating.is_positive() {
            if let Some(feed_url) = self.item_feeds.get(&item).map(|f| f.clone()) {
                let already = merged
                    .iter()
                    .any(|e| e.source.is_feed() && e.source.id == feed_url);
                if !already {
                    merged.push(PriorEntry {
                        stamp: (now - Duration::days(1), 0),
                        source: Source::feed(feed_url),
                        rating: Rating::Positive,
                        fixed_ranks: false,
                    });
                }
            }
        }
        merged.sort_by(|a, b| a.stamp.cmp(&b.stamp));

        // Every feed url is endorsed by its own feed from the beginning of time.
        if let Some(url) = self.items.url(item).filter(|url| self.is_feed(url)) {
            merged.insert(
                0,
                PriorEntry {
                    stamp: (DateTime::<Utc>::MIN_UTC, 0),
                    source: Source::feed(url),
                    rating: Rating::Positive,
                    fixed_ranks: true,
                },
            );
        }

        let mut priors = Vec::new();
        for entry in merged {
            // Anything after the subscriber's own judgment is not prior.
            if entry.source == *subscriber {
                break;
            }
            let ranks_since_shared = if entry.fixed_ranks {
                0
            } else {
                timeline
                    .count_since(&entry.source, entry.stamp)
                    .saturating_sub(1)
            };
            priors.push((entry.source, entry.rating, ranks_since_shared));
        }
        drop(timeline);

        let mut result: Vec<PriorJudgment> = priors
            .into_iter()
            .map(|(publisher, rating, ranks_since_shared)| {
                let polarity = if rating.is_positive() {
                    Polarity::Positive
                } else {
                    Polarity::Negative
                };
                PriorJudgment {
                    weight: self.weight_of(subscriber, &publisher, polarity),
                    publisher,
                    rating,
                    ranks_since_shared,
                }
            })
            .collect();
        result.reverse();
        Ok(result)
    }

    async fn subscribers(
        &self,
        publisher: &Source,
        polarity: Polarity,
    ) -> Result<Vec<Subscription>, StoreError> {
        let mut result: Vec<Subscription> = self
            .connections
            .iter()
            .filter(|c| {
                c.key.publisher == *publisher
                    && c.key.polarity == polarity
                    && c.key.version == self.config.connection_version
            })
            .map(|c| Subscription {
                subscriber: c.key.subscriber.clone(),
                weight: c.weight,
            })
            .collect();
        result.sort_by(|a, b| a.subscriber.cmp(&b.subscriber));
        Ok(result)
    }

    fn can_subscribe(&self, source: &Source) -> bool {
        // Only users subscribe to other users and feeds.
        source.is_user()
    }
}

#[async_trait]
impl CandidateProvider for MemoryStore {
    async fn top_connections(&self, query: &ConnectionQuery) -> Result<Vec<Connection>, StoreError> {
        let now = self.clock.now();
        let mut result: Vec<Connection> = self
            .connections
            .iter()
            .filter(|c| {
                let key = &c.key;
                key.subscriber.is_user()
                    && key.subscriber.id == query.subscriber_id
                    && key.publisher.source_type == query.publisher_type
                    && key.version == query.version
                    && query
                        .subscriber_category
                        .map_or(true, |category| key.subscriber.category == category)
                    && (!query.positive_only || (key.polarity.is_positive() && c.weight > 0.0))
                    && query
                        .active_within_days
                        .map_or(true, |days| c.is_active_within(days, now))
            })
            .map(|c| c.clone())
            .collect();
        result.sort_by(|a, b| b.weight.total_cmp(&a.weight).then_with(|| a.key.cmp(&b.key)));
        result.truncate(query.limit);
        Ok(result)
    }

    async fn recent_judgments(&self, query: &JudgmentQuery) -> Result<Vec<Judgment>, StoreError> {
        let timeline = self.timeline.read();
        Ok(timeline
            .judgments
            .iter()
            .rev()
            .take_while(|(stamp, _)| query.since.map_or(true, |since| stamp.0 > since))
            .take(query.limit)
            .map(|(_, j)| j.clone())
            .collect())
    }

    async fn feed_items(
        &self,
        feed_urls: &[String],
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<FeedItem>, StoreError> {
        let wanted: HashSet<&str> = feed_urls.iter().map(String::as_str).collect();
        let timeline = self.timeline.read();
        Ok(timeline
            .feed_items
            .iter()
            .rev()
            .take_while(|(stamp, _)| since.map_or(true, |since| stamp.0 > since))
            .filter(|(_, f)| wanted.contains(f.feed_url.as_str()))
            .map(|(_, f)| f.clone())
            .collect())
    }

    async fn rated_item_ids(&self, user_id: &str) -> Result<HashSet<ItemId>, StoreError> {
        let timeline = self.timeline.read();
        Ok(timeline
            .judgments
            .values()
            .rev()
            .filter(|j| j.source.is_user() && j.source.id == user_id)
            .take(self.config.rated_items_limit)
            .map(|j| j.item)
            .collect())
    }
}

#[async_trait]
impl ItemResolver for MemoryStore {
    async fn item_id(&self, url: &str) -> Result<ItemId, StoreError> {
        Ok(self.items.get_or_insert(url))
    }

    async fn item_ids(&self, urls: &[String]) -> Result<HashMap<String, ItemId>, StoreError> {
        Ok(urls
            .iter()
            .filter_map(|url| self.items.id(url).map(|id| (url.clone(), id)))
            .collect())
    }

    async fn item_urls(&self, items: &[ItemId]) -> Result<HashMap<ItemId, String>, StoreError> {
        Ok(items
            .iter()
            .filter_map(|id| self.items.url(*id).map(|url| (*id, url)))
            .collect())
    }
}

#[async_trait]
impl CategoryDirectory for MemoryStore {
    async fn category_exists(&self, user_id: &str, category: CategoryId) -> Result<bool, StoreError> {
        Ok(self.categories.contains_key(&(user_id.to_string(), category)))
    }
}

#[async_trait]
impl PastRecommendationStore for MemoryStore {
    async fn save_past_recommendations(
        &self,
        user_id: &str,
        period: TimePeriod,
        recommendations: &[Recommendation],
        saved_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.past.save(user_id, period, recommendations, saved_at)
    }

    async fn commit_past_recommendations(
        &self,
        user_id: &str,
        period: TimePeriod,
        saved_at: DateTime<Utc>,
    ) -> Result<Option<SessionSummary>, StoreError> {
        Ok(self.past.commit(user_id, period, saved_at))
    }

    async fn past_recommendation_ids(
        &self,
        user_id: &str,
        period: Option<TimePeriod>,
    ) -> Result<HashSet<ItemId>, StoreError> {
        Ok(self.past.item_ids(user_id, period))
    }
}

#[async_trait]
impl JudgmentLog for MemoryStore {
    async fn record_judgment(&self, judgment: Judgment) -> Result<(), StoreError> {
        if judgment.source.is_feed() {
            let feed_url = judgment.source.id.clone();
            self.record_feed_items(&feed_url, &[judgment.item], judgment.timestamp)
                .await?;
            return Ok(());
        }

        let mut timeline = self.timeline.write();
        let index_key = (judgment.source.id.clone(), judgment.item);
        if let Some(previous) = timeline.judgment_index.remove(&index_key) {
            timeline.judgments.remove(&previous);
        }
        let stamp = timeline.next_stamp(judgment.timestamp);
        debug!(
            "Recorded judgment {} of item {} by {}",
            judgment.rating.value(),
            judgment.item,
            judgment.source
        );
        timeline.judgment_index.insert(index_key, stamp);
        timeline.judgments.insert(stamp, judgment);
        Ok(())
    }

    async fn current_judgment(&self, user_id: &str, item: ItemId) -> Result<Option<Judgment>, StoreError> {
        let timeline = self.timeline.read();
        Ok(timeline
            .judgment_index
            .get(&(user_id.to_string(), item))
            .and_then(|stamp| timeline.judgments.get(stamp))
            .cloned())
    }

    async fn record_feed_items(
        &self,
        feed_url: &str,
        items: &[ItemId],
        published_at: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        self.register_feed(feed_url);
        let mut timeline = self.timeline.write();
        let mut added = 0;
        for item in items {
            if !timeline.feed_index.insert((feed_url.to_string(), *item)) {
                continue;
            }
            let stamp = timeline.next_stamp(published_at);
            timeline.feed_items.insert(
                stamp,
                FeedItem {
                    item: *item,
                    feed_url: feed_url.to_string(),
                    published_at,
                },
            );
            added += 1;
        }
        debug!("Feed {} published {} new items", feed_url, added);
        Ok(added)
    }
}
