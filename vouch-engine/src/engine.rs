//! Recommendation Engine
//!
//! Gathers candidates and exclusion sets concurrently, each under its own
//! deadline, then scores, ranks, diversifies and resolves them in memory.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info};

use vouch_core::{Connection, ItemId, Recommendation, SourceType, ValidationError};
use vouch_store::{ConnectionQuery, JudgmentQuery, SharedBackend, SharedClock, SystemClock};

use crate::fetch::{degrade, require};
use crate::scoring::{merge_feed_connections, CandidateScorer, Exclusions, ScoringParams};
use crate::{diversify_by_key, EngineConfig, EngineError, RecommendationRequest};

/// Computes recommendations on demand
pub struct RecommendationEngine {
    backend: SharedBackend,
    config: EngineConfig,
    clock: SharedClock,
}

impl RecommendationEngine {
    pub fn new(backend: SharedBackend, config: EngineConfig) -> Self {
        Self {
            backend,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Ranked recommendations for `request.subscriber`
    pub async fn recommendations_on_demand(
        &self,
        request: &RecommendationRequest,
    ) -> Result<Vec<Recommendation>, EngineError> {
        request.validate()?;
        let deadline = self.config.fetch_timeout();
        let subscriber = request.subscriber.as_str();

        if let (Some(category), false) = (request.category, request.any_category) {
            let exists = degrade(
                "category",
                deadline,
                self.backend.category_exists(subscriber, category),
            )
            .await
            .unwrap_or(true);
            if !exists {
                return Err(ValidationError::UnknownCategory(category).into());
            }
        }

        let now = self.clock.now();
        let since = request.time_period.since(now);
        let active_days = request.time_period.active_days_bucket();

        let external = request
            .external_connections
            .as_ref()
            .filter(|connections| !connections.is_empty());
        let external_of = |publisher_type: SourceType| -> Vec<Connection> {
            external
                .map(|connections| {
                    connections
                        .iter()
                        .filter(|c| c.publisher().source_type == publisher_type)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        };
        let connection_query = |publisher_type: SourceType, positive_only: bool, limit: usize| {
            ConnectionQuery {
                subscriber_id: subscriber.to_string(),
                publisher_type,
                version: request.connection_version.clone(),
                subscriber_category: request.subscriber_category(),
                active_within_days: active_days,
                positive_only,
                limit,
            }
        };

        let past_fetch = async {
            if !request.exclude_past_recommendations {
                return HashSet::new();
            }
            let scope = if request.exclude_past_recommendations_from_all_time_periods {
                None
            } else {
                Some(request.time_period)
            };
            degrade(
                "past recommendations",
                deadline,
                self.backend.past_recommendation_ids(subscriber, scope),
            )
            .await
            .unwrap_or_default()
        };

        let rated_fetch = async {
            if !request.exclude_rated_items {
                return HashSet::new();
            }
            degrade("rated items", deadline, self.backend.rated_item_ids(subscriber))
                .await
                .unwrap_or_default()
        };

        let excluded_fetch = async {
            if request.exclude_urls.is_empty() {
                return HashSet::new();
            }
            degrade(
                "excluded items",
                deadline,
                self.backend.item_ids(&request.exclude_urls),
            )
            .await
            .map(|ids| ids.into_values().collect::<HashSet<ItemId>>())
            .unwrap_or_default()
        };

        let user_fetch = async {
            if !request.source_type.includes_users() {
                return (Vec::new(), Vec::new());
            }
            let connections = async {
                if external.is_some() {
                    return external_of(SourceType::User);
                }
                let query =
                    connection_query(SourceType::User, false, self.config.max_user_connections);
                degrade("user connections", deadline, self.backend.top_connections(&query))
                    .await
                    .unwrap_or_default()
            };
            let judgments = async {
                let query = JudgmentQuery {
                    since,
                    limit: self.config.max_recent_judgments,
                };
                degrade("recent judgments", deadline, self.backend.recent_judgments(&query))
                    .await
                    .unwrap_or_default()
            };
            tokio::join!(connections, judgments)
        };

        let feed_fetch = async {
            if !request.source_type.includes_feeds() {
                return (Vec::new(), Vec::new());
            }
            let connections = match external {
                Some(_) => external_of(SourceType::Feed),
                None => {
                    let query =
                        connection_query(SourceType::Feed, true, self.config.max_feed_connections);
                    degrade("feed connections", deadline, self.backend.top_connections(&query))
                        .await
                        .unwrap_or_default()
                }
            };
            let feed_connections = merge_feed_connections(&connections, since);
            if feed_connections.is_empty() {
                return (feed_connections, Vec::new());
            }
            let feed_urls: Vec<String> =
                feed_connections.iter().map(|c| c.feed_url.clone()).collect();
            let items = degrade("feed items", deadline, self.backend.feed_items(&feed_urls, since))
                .await
                .unwrap_or_default();
            (feed_connections, items)
        };

        let (past, rated, items, (user_connections, judgments), (feed_connections, feed_items)) =
            tokio::join!(past_fetch, rated_fetch, excluded_fetch, user_fetch, feed_fetch);
        debug!(
            "Request for {}: {} judgments, {} user connections, {} feed items from {} feeds",
            subscriber,
            judgments.len(),
            user_connections.len(),
            feed_items.len(),
            feed_connections.len()
        );

        let exclusions = Exclusions { items, rated, past };
        let params = ScoringParams {
            nominal_weight: if request.include_popular {
                self.config.nominal_user_vote_weight
            } else {
                0.0
            },
            decay_rate: request.decay_rate,
            max_top_sources: self.config.max_top_sources,
            max_top_feeds: self.config.max_top_feeds,
        };
        let mut scorer = CandidateScorer::new(params, &exclusions);
        scorer.score_judgments(subscriber, &judgments, &user_connections);
        scorer.score_feed_items(feed_items, &feed_connections);
        let (mut ranked, stats) = scorer.finish();

        if stats.judgments_matched_past + stats.feed_items_matched_past > 0 {
            info!(
                "Skipped {} judged and {} published items already recommended to {}",
                stats.judgments_matched_past, stats.feed_items_matched_past, subscriber
            );
        }

        if request.diversify {
            ranked = diversify_by_key(ranked, request.limit, Recommendation::connections_signature);
        }
        ranked.truncate(request.limit);

        self.resolve_urls(&mut ranked).await?;

        if request.save_past_recommendations {
            degrade(
                "past recommendation save",
                deadline,
                self.backend.save_past_recommendations(
                    subscriber,
                    request.time_period,
                    &ranked,
                    now,
                ),
            )
            .await;
        }

        info!(
            "Recommended {} of {} candidates to {}",
            ranked.len(),
            stats.candidates,
            subscriber
        );
        Ok(ranked)
    }

    async fn resolve_urls(&self, ranked: &mut [Recommendation]) -> Result<(), EngineError> {
        if ranked.is_empty() {
            return Ok(());
        }
        let mut ids: Vec<ItemId> = ranked.iter().map(|r| r.item).collect();
        ids.extend(ranked.iter().flat_map(|r| r.top_sources.iter().map(|p| p.item)));
        ids.sort_unstable();
        ids.dedup();

        let urls = require(self.config.fetch_timeout(), self.backend.item_urls(&ids)).await?;
        for recommendation in ranked.iter_mut() {
            recommendation.destination_url = urls.get(&recommendation.item).cloned();
            if recommendation.destination_url.is_none() {
                error!("Recommended item {} has no url", recommendation.item);
            }
            for page in &mut recommendation.top_sources {
                page.url = urls.get(&page.item).cloned();
            }
        }
        Ok(())
    }
}
