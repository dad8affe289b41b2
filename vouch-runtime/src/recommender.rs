//! Recommender service
//!
//! Front door of the system. Judgments and feed publications are recorded
//! synchronously; learning from them happens on the work queue.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use vouch_core::{validate_identifier, ItemId, Judgment, Rating, Recommendation, Source};
use vouch_engine::fetch::require;
use vouch_engine::{ConnectionTrainer, RecommendationEngine, RecommendationRequest};
use vouch_store::{
    MemoryStore, SharedBackend, SharedClock, SharedConnectionStore, SharedJudgmentLog,
};

use crate::{RecommenderConfig, Task, TaskError, TaskHandler, WorkQueue};

/// Runs deferred tasks against the trainer and the stores
struct RecommenderTasks {
    trainer: ConnectionTrainer,
    log: SharedJudgmentLog,
    backend: SharedBackend,
    deadline: Duration,
}

#[async_trait]
impl TaskHandler for RecommenderTasks {
    async fn handle(&self, task: &Task) -> Result<(), TaskError> {
        match task {
            Task::JudgmentAdded { source, item, rating } => {
                // The judgment may have been removed or re-categorised since;
                // a re-categorised judgment is trained by its own task.
                let current =
                    require(self.deadline, self.log.current_judgment(&source.id, *item)).await?;
                let still_current = current
                    .as_ref()
                    .is_some_and(|j| j.source == *source && j.rating == *rating);
                if !still_current {
                    debug!("Skipping stale {}", task);
                    return Ok(());
                }
                let summary = self.trainer.judgment_added(source, *item, *rating).await?;
                debug!(
                    "Trained {}: {} connections updated, {} decayed",
                    task, summary.connections_updated, summary.subscribers_decayed
                );
            }
            Task::DecayPublisher { publisher, num_items } => {
                self.trainer
                    .decay_connection_weight_to_publisher(publisher, *num_items)
                    .await?;
            }
            Task::CommitPastRecommendations {
                user_id,
                time_period,
                saved_at,
            } => {
                let summary = require(
                    self.deadline,
                    self.backend
                        .commit_past_recommendations(user_id, *time_period, *saved_at),
                )
                .await?;
                if let Some(summary) = summary {
                    info!(
                        "Committed session {} of {} recommendations for {}",
                        summary.session_number, summary.recommendation_count, user_id
                    );
                }
            }
        }
        Ok(())
    }
}

/// The recommendation service
pub struct Recommender {
    backend: SharedBackend,
    log: SharedJudgmentLog,
    clock: SharedClock,
    engine: RecommendationEngine,
    queue: WorkQueue,
    config: RecommenderConfig,
}

impl Recommender {
    /// Build the service and start its worker; must be called inside a
    /// tokio runtime
    pub fn new(
        connections: SharedConnectionStore,
        backend: SharedBackend,
        log: SharedJudgmentLog,
        clock: SharedClock,
        config: RecommenderConfig,
    ) -> Result<Self> {
        let trainer = ConnectionTrainer::new(connections, config.trainer.clone())
            .context("invalid trainer settings")?;
        let engine =
            RecommendationEngine::new(backend.clone(), config.engine.clone()).with_clock(clock.clone());
        let tasks = RecommenderTasks {
            trainer,
            log: log.clone(),
            backend: backend.clone(),
            deadline: config.runtime.store_timeout(),
        };
        let queue = WorkQueue::start(Arc::new(tasks), config.runtime.clone());
        Ok(Self {
            backend,
            log,
            clock,
            engine,
            queue,
            config,
        })
    }

    /// Service backed entirely by one in-memory store
    pub fn in_memory(store: Arc<MemoryStore>, config: RecommenderConfig) -> Result<Self> {
        let clock = store.clock();
        Self::new(store.clone(), store.clone(), store, clock, config)
    }

    pub fn config(&self) -> &RecommenderConfig {
        &self.config
    }

    pub fn engine(&self) -> &RecommendationEngine {
        &self.engine
    }

    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    /// Record a judgment of `url` by `source` and schedule its training
    pub async fn add_judgment(&self, source: Source, url: &str, rating: Rating) -> Result<ItemId> {
        source.validate()?;
        validate_identifier(url)?;
        if !source.is_user() {
            bail!("only users judge items, got {}", source);
        }
        let deadline = self.config.runtime.store_timeout();
        if let Some(category) = source.category {
            if !require(deadline, self.backend.category_exists(&source.id, category)).await? {
                return Err(vouch_core::ValidationError::UnknownCategory(category).into());
            }
        }

        let item = require(deadline, self.backend.item_id(url)).await?;
        let judgment = Judgment::new(source.clone(), item, rating, self.clock.now());
        require(deadline, self.log.record_judgment(judgment)).await?;

        if !rating.is_neutral() {
            self.queue.submit_after(
                Task::JudgmentAdded { source, item, rating },
                self.config.runtime.training_delay(),
            );
        }
        Ok(item)
    }

    /// Record items published by a feed; returns how many were new
    ///
    /// A single decay task covers the whole batch.
    pub async fn publish_feed_items(
        &self,
        feed_url: &str,
        urls: &[String],
        published_at: Option<DateTime<Utc>>,
    ) -> Result<usize> {
        validate_identifier(feed_url)?;
        let deadline = self.config.runtime.store_timeout();
        let mut items = Vec::with_capacity(urls.len());
        for url in urls {
            validate_identifier(url)?;
            items.push(require(deadline, self.backend.item_id(url)).await?);
        }
        let published_at = published_at.unwrap_or_else(|| self.clock.now());
        let added = require(
            deadline,
            self.log.record_feed_items(feed_url, &items, published_at),
        )
        .await?;

        if added > 0 {
            info!("Feed {} published {} new items", feed_url, added);
            self.queue.submit(Task::DecayPublisher {
                publisher: Source::feed(feed_url),
                num_items: u32::try_from(added).unwrap_or(u32::MAX),
            });
        }
        Ok(added)
    }

    /// Serve recommendations, scheduling the commit of a saved page
    pub async fn recommend(&self, request: &RecommendationRequest) -> Result<Vec<Recommendation>> {
        let recommendations = self.engine.recommendations_on_demand(request).await?;
        if request.save_past_recommendations && !recommendations.is_empty() {
            self.queue.submit_after(
                Task::CommitPastRecommendations {
                    user_id: request.subscriber.clone(),
                    time_period: request.time_period,
                    saved_at: self.clock.now(),
                },
                self.config.runtime.commit_delay(),
            );
        }
        Ok(recommendations)
    }

    /// Wait for every scheduled task to finish
    pub async fn drain(&self) {
        self.queue.drain().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use vouch_core::{Polarity, TimePeriod};
    use vouch_store::{ConnectionStore, JudgmentLog, ManualClock, StoreConfig, StoreError};

    use crate::RuntimeConfig;

    struct Harness {
        clock: Arc<ManualClock>,
        store: Arc<MemoryStore>,
        recommender: Recommender,
    }

    impl Harness {
        fn new(runtime: RuntimeConfig) -> Self {
            let clock = Arc::new(ManualClock::new(Utc::now()));
            let store = Arc::new(MemoryStore::with_clock(StoreConfig::default(), clock.clone()));
            let config = RecommenderConfig {
                runtime,
                ..RecommenderConfig::default()
            };
            let recommender = Recommender::in_memory(store.clone(), config).unwrap();
            Self {
                clock,
                store,
                recommender,
            }
        }

        async fn judge(&self, user: &str, url: &str, rating: Rating) {
            self.clock.advance(Duration::seconds(1));
            self.recommender
                .add_judgment(Source::user(user, None), url, rating)
                .await
                .unwrap();
            self.recommender.drain().await;
        }

        async fn recommend(&self, user: &str) -> Vec<String> {
            let request = RecommendationRequest::new(user).any_category();
            self.recommender
                .recommend(&request)
                .await
                .unwrap()
                .into_iter()
                .filter_map(|r| r.destination_url)
                .collect()
        }

        async fn weight(&self, subscriber: &str, publisher: Source) -> f64 {
            self.store
                .get_weight(&Source::user(subscriber, None), &publisher, Polarity::Positive)
                .await
                .unwrap()
        }
    }

    fn immediate() -> RuntimeConfig {
        RuntimeConfig::default().with_commit_delay_secs(0)
    }

    #[tokio::test]
    async fn test_reciprocated_items_win_back_trust() {
        let h = Harness::new(immediate());
        for user in ["a", "b", "c"] {
            h.judge(user, "http://x.test", Rating::Positive).await;
        }
        h.judge("a", "http://y.test", Rating::Positive).await;
        h.judge("b", "http://z.test", Rating::Positive).await;

        let request = RecommendationRequest::new("c").any_category();
        let result = h.recommender.recommend(&request).await.unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].weight, result[1].weight);

        // a keeps publishing what c ignores.
        h.judge("a", "http://w.test", Rating::Positive).await;
        assert_eq!(h.recommend("c").await[0], "http://z.test");

        // Until c endorses one of a's items.
        h.judge("c", "http://y.test", Rating::Positive).await;
        assert_eq!(h.recommend("c").await, vec!["http://w.test", "http://z.test"]);
    }

    #[tokio::test]
    async fn test_stale_judgments_are_not_trained() {
        let h = Harness::new(immediate().with_training_delay_ms(20));
        h.judge("a", "http://x.test", Rating::Positive).await;

        let c = Source::user("c", None);
        h.recommender
            .add_judgment(c.clone(), "http://x.test", Rating::Positive)
            .await
            .unwrap();
        h.recommender
            .add_judgment(c, "http://x.test", Rating::Negative)
            .await
            .unwrap();
        h.recommender.drain().await;

        assert!(h.weight("c", Source::user("a", None)).await < 0.0);
        let connection = &h.store.connections_of("c")[0];
        assert_eq!(connection.num_shared_items, 0);
    }

    #[tokio::test]
    async fn test_feed_publication_decays_after_grace_period() {
        let h = Harness::new(immediate());
        let feed_url = "http://news.test/rss";
        let feed = Source::feed(feed_url);
        let urls = |names: &[&str]| -> Vec<String> {
            names.iter().map(|n| format!("http://news.test/{}", n)).collect()
        };

        let added = h
            .recommender
            .publish_feed_items(feed_url, &urls(&["1", "2"]), None)
            .await
            .unwrap();
        assert_eq!(added, 2);
        h.judge("c", "http://news.test/1", Rating::Positive).await;
        let trained = h.weight("c", feed.clone()).await;
        assert!(trained > 0.0);

        // Re-publishing known items is not news.
        let again = h
            .recommender
            .publish_feed_items(feed_url, &urls(&["1", "2"]), None)
            .await
            .unwrap();
        assert_eq!(again, 0);

        // Fresh subscriptions are shielded from the feed's backlog.
        h.recommender
            .publish_feed_items(feed_url, &urls(&["3", "4", "5"]), None)
            .await
            .unwrap();
        h.recommender.drain().await;
        assert_eq!(h.weight("c", feed.clone()).await, trained);

        h.clock.advance(Duration::hours(2));
        h.recommender
            .publish_feed_items(feed_url, &urls(&["6"]), None)
            .await
            .unwrap();
        h.recommender.drain().await;
        let decayed = h.weight("c", feed).await;
        assert!(decayed < trained && decayed > 0.0);
    }

    #[tokio::test]
    async fn test_saved_recommendations_are_committed() {
        let h = Harness::new(immediate());
        h.judge("a", "http://x.test", Rating::Positive).await;
        h.judge("c", "http://x.test", Rating::Positive).await;
        h.judge("a", "http://y.test", Rating::Positive).await;

        let request = RecommendationRequest::new("c")
            .any_category()
            .save_past_recommendations()
            .exclude_past_recommendations(false);
        assert_eq!(h.recommender.recommend(&request).await.unwrap().len(), 1);
        h.recommender.drain().await;

        assert!(h.recommender.recommend(&request).await.unwrap().is_empty());
        let sessions = h.store.past_recommendations().sessions("c");
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].time_period, TimePeriod::Day);
    }

    /// Records judgments but never answers lookups of them
    struct HungLookups(Arc<MemoryStore>);

    #[async_trait]
    impl JudgmentLog for HungLookups {
        async fn record_judgment(&self, judgment: Judgment) -> Result<(), StoreError> {
            self.0.record_judgment(judgment).await
        }

        async fn current_judgment(
            &self,
            _: &str,
            _: ItemId,
        ) -> Result<Option<Judgment>, StoreError> {
            std::future::pending().await
        }

        async fn record_feed_items(
            &self,
            feed_url: &str,
            items: &[ItemId],
            published_at: DateTime<Utc>,
        ) -> Result<usize, StoreError> {
            self.0.record_feed_items(feed_url, items, published_at).await
        }
    }

    #[tokio::test]
    async fn test_hung_store_does_not_stall_the_queue() {
        let store = Arc::new(MemoryStore::default());
        let config = RecommenderConfig {
            runtime: immediate()
                .with_store_timeout_ms(20)
                .with_max_attempts(2)
                .with_retry_backoff_ms(1)
                .with_retry_jitter_ms(0),
            ..RecommenderConfig::default()
        };
        let recommender = Recommender::new(
            store.clone(),
            store.clone(),
            Arc::new(HungLookups(store.clone())),
            store.clock(),
            config,
        )
        .unwrap();

        for user in ["a", "c"] {
            recommender
                .add_judgment(Source::user(user, None), "http://x.test", Rating::Positive)
                .await
                .unwrap();
        }
        tokio::time::timeout(std::time::Duration::from_secs(5), recommender.drain())
            .await
            .expect("queue must drain once lookups time out");

        assert_eq!(recommender.queue().pending(), 0);
        assert!(store.connections_of("c").is_empty());
    }

    #[tokio::test]
    async fn test_rejects_invalid_input() {
        let h = Harness::new(immediate());
        assert!(h
            .recommender
            .add_judgment(Source::user("a", Some(99)), "http://x.test", Rating::Positive)
            .await
            .is_err());
        assert!(h
            .recommender
            .add_judgment(Source::feed("http://f.test"), "http://x.test", Rating::Positive)
            .await
            .is_err());
        assert!(h
            .recommender
            .add_judgment(Source::user("a", None), "", Rating::Positive)
            .await
            .is_err());
        assert_eq!(h.recommender.queue().pending(), 0);
    }
}
