//! Connection Trainer
//!
//! Online logistic regression over prior judges of an item:
//! - the subscriber's trust weights to everyone who judged the item before
//!   form the features, the subscriber's own judgment is the label
//! - updates are discounted by how many judgments a publisher has made since
//!   the shared one, so mass-endorsing popular items earns little
//! - every endorsement also decays the publisher's subscribers a bit toward
//!   neutral; only reciprocated items win that trust back

use futures::{stream, TryStreamExt};
use tracing::{debug, info};

use vouch_core::{
    sigmoid, ItemId, Polarity, PriorJudgment, Rating, Source, ValidationError, NEUTRAL_PREDICTION,
};
use vouch_store::{SharedConnectionStore, StoreError, WeightWrite};

use crate::fetch::require;
use crate::{TrainError, TrainerConfig};

/// What a training unit touched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrainingSummary {
    /// Prior judges whose connection was rewritten
    pub connections_updated: usize,
    /// Subscribers whose connection to the judging source decayed
    pub subscribers_decayed: usize,
}

/// Learns trust weights from judgments
pub struct ConnectionTrainer {
    store: SharedConnectionStore,
    config: TrainerConfig,
}

impl ConnectionTrainer {
    pub fn new(store: SharedConnectionStore, config: TrainerConfig) -> Result<Self, ValidationError> {
        config.validate()?;
        Ok(Self { store, config })
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Train connections of `source` from its new judgment of `item`
    pub async fn judgment_added(
        &self,
        source: &Source,
        item: ItemId,
        rating: Rating,
    ) -> Result<TrainingSummary, TrainError> {
        let mut summary = TrainingSummary::default();
        if rating.is_neutral() {
            return Ok(summary);
        }
        source.validate()?;

        if self.store.can_subscribe(source) {
            let deadline = self.config.store_timeout();
            let priors: Vec<PriorJudgment> =
                require(deadline, self.store.prior_judgments(item, source, rating))
                    .await?
                    .into_iter()
                    .filter(|p| p.publisher != *source)
                    .collect();
            debug!("{} judged item {} after {} prior judges", source, item, priors.len());

            // Every weight is read before the first write so the update is
            // computed against a single snapshot.
            let writes = self.training_writes(source, item, rating, &priors);
            for write in writes {
                require(deadline, self.store.set_weight(write)).await?;
                summary.connections_updated += 1;
            }
        }

        if rating.is_positive() {
            summary.subscribers_decayed = self.decay_connection_weight_to_publisher(source, 1).await?;
        }
        Ok(summary)
    }

    /// Weight writes for one judgment given its prior judges
    pub fn training_writes(
        &self,
        subscriber: &Source,
        item: ItemId,
        rating: Rating,
        priors: &[PriorJudgment],
    ) -> Vec<WeightWrite> {
        if priors.is_empty() || rating.is_neutral() {
            return Vec::new();
        }
        let contribution = self.config.default_contribution;
        let hypothesis = sigmoid(priors.iter().map(|p| p.weight * p.rating.as_f64()).sum());
        let label = if rating.is_positive() { 1.0 } else { 0.0 };
        let normalizer = priors.len() as f64 * contribution
            + priors.iter().map(|p| p.weight.abs()).sum::<f64>();
        let retention = 1.0 - self.config.ignore_learning_rate;

        priors
            .iter()
            .filter_map(|prior| {
                let polarity = Polarity::of(prior.rating)?;
                let power =
                    (contribution + prior.weight.abs()) * self.config.learning_rate / normalizer;
                let mut delta = -power * (hypothesis - label) * prior.rating.as_f64();
                delta *= retention.powi(prior.ranks_since_shared.min(i32::MAX as u32) as i32);

                let shared = (rating.is_positive() && prior.rating.is_positive()).then_some(item);
                Some(
                    WeightWrite::new(
                        subscriber.clone(),
                        prior.publisher.clone(),
                        polarity,
                        prior.weight + delta,
                    )
                    .with_shared_item(shared),
                )
            })
            .collect()
    }

    /// Pull every positive trust in `publisher` toward neutral as if
    /// `num_items` unreciprocated items had been published.
    ///
    /// One pass over the subscribers regardless of `num_items`. Returns how
    /// many connections were rewritten.
    pub async fn decay_connection_weight_to_publisher(
        &self,
        publisher: &Source,
        num_items: u32,
    ) -> Result<usize, TrainError> {
        if num_items == 0 {
            return Ok(0);
        }
        let deadline = self.config.store_timeout();
        let subscribers =
            require(deadline, self.store.subscribers(publisher, Polarity::Positive)).await?;

        // Negative connections never decay; distrust has to be earned back.
        let writes: Vec<WeightWrite> = subscribers
            .into_iter()
            .filter(|s| s.weight > 0.0)
            .map(|s| {
                WeightWrite::new(
                    s.subscriber,
                    publisher.clone(),
                    Polarity::Positive,
                    self.decayed_weight(s.weight, num_items),
                )
                .publisher_voted()
            })
            .collect();
        let count = writes.len();

        let store = &self.store;
        stream::iter(writes.into_iter().map(Ok::<_, StoreError>))
            .try_for_each_concurrent(self.config.decay_concurrency, |write| async move {
                require(deadline, store.set_weight(write)).await
            })
            .await?;

        if count > 0 {
            info!("Decayed {} connections to {} over {} items", count, publisher, num_items);
        }
        Ok(count)
    }

    /// `weight` after `num_items` decay steps
    ///
    /// Each step moves at most a quarter of the way to 0, so a positive weight
    /// stays positive. Stops early once the step underflows.
    pub fn decayed_weight(&self, mut weight: f64, num_items: u32) -> f64 {
        for _ in 0..num_items {
            let step = self.config.ignore_learning_rate * (sigmoid(weight) - NEUTRAL_PREDICTION);
            if step == 0.0 {
                break;
            }
            weight -= step;
        }
        weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::Arc;
    use vouch_core::{Connection, Judgment, Subscription};
    use vouch_store::{ConnectionStore, JudgmentLog, MemoryStore};

    struct Harness {
        store: Arc<MemoryStore>,
        trainer: ConnectionTrainer,
    }

    impl Harness {
        fn new() -> Self {
            let store = Arc::new(MemoryStore::default());
            let config = TrainerConfig::default()
                .with_learning_rate(0.01)
                .with_ignore_learning_rate(0.001);
            let trainer = ConnectionTrainer::new(store.clone(), config).unwrap();
            Self { store, trainer }
        }

        async fn judge(&self, user: &str, item: ItemId, rating: Rating) -> TrainingSummary {
            let source = Source::user(user, None);
            let judgment = Judgment::new(source.clone(), item, rating, self.store.now());
            self.store.record_judgment(judgment).await.unwrap();
            self.trainer.judgment_added(&source, item, rating).await.unwrap()
        }

        async fn weight(&self, subscriber: &str, publisher: &str, polarity: Polarity) -> f64 {
            self.store
                .get_weight(
                    &Source::user(subscriber, None),
                    &Source::user(publisher, None),
                    polarity,
                )
                .await
                .unwrap()
        }

        fn snapshot(&self, users: &[&str]) -> Vec<Connection> {
            users.iter().flat_map(|u| self.store.connections_of(u)).collect()
        }
    }

    #[tokio::test]
    async fn test_shared_endorsement_builds_trust() {
        let h = Harness::new();
        h.judge("user1", 1, Rating::Positive).await;
        h.judge("user2", 1, Rating::Positive).await;
        assert!(h.weight("user2", "user1", Polarity::Positive).await > 0.0);
        assert_eq!(h.weight("user1", "user2", Polarity::Positive).await, 0.0);

        // Equally connected to both earlier endorsers.
        h.judge("user3", 1, Rating::Positive).await;
        let to_user1 = h.weight("user3", "user1", Polarity::Positive).await;
        assert!(to_user1 > 0.0);
        assert_eq!(to_user1, h.weight("user3", "user2", Polarity::Positive).await);

        // An unreciprocated item from user1 costs some trust.
        h.judge("user1", 2, Rating::Positive).await;
        assert!(
            h.weight("user3", "user1", Polarity::Positive).await
                < h.weight("user3", "user2", Polarity::Positive).await
        );

        // Reciprocating it more than wins it back.
        h.judge("user3", 2, Rating::Positive).await;
        assert!(
            h.weight("user3", "user1", Polarity::Positive).await
                > h.weight("user3", "user2", Polarity::Positive).await
        );
    }

    #[tokio::test]
    async fn test_disagreement_is_negative_trust() {
        let h = Harness::new();
        h.judge("user1", 1, Rating::Positive).await;
        h.judge("user2", 1, Rating::Negative).await;
        assert!(h.weight("user2", "user1", Polarity::Positive).await < 0.0);
    }

    #[tokio::test]
    async fn test_shared_rejection_trusts_negative_votes_only() {
        let h = Harness::new();
        h.judge("user1", 1, Rating::Negative).await;
        h.judge("user2", 1, Rating::Negative).await;
        assert!(h.weight("user2", "user1", Polarity::Negative).await > 0.0);
        assert_eq!(h.weight("user2", "user1", Polarity::Positive).await, 0.0);
    }

    #[tokio::test]
    async fn test_more_popular_item_means_weaker_connection() {
        let h = Harness::new();
        h.judge("user1", 1, Rating::Positive).await;
        h.judge("user2", 1, Rating::Positive).await;
        h.judge("user4", 1, Rating::Positive).await;

        h.judge("user3", 2, Rating::Positive).await;
        h.judge("user4", 2, Rating::Positive).await;

        assert!(
            h.weight("user4", "user3", Polarity::Positive).await
                > h.weight("user4", "user1", Polarity::Positive).await
        );
    }

    #[tokio::test]
    async fn test_shared_item_recorded_only_for_mutual_endorsement() {
        let h = Harness::new();
        h.judge("user1", 1, Rating::Positive).await;
        h.judge("user2", 1, Rating::Positive).await;
        h.judge("user3", 2, Rating::Negative).await;
        h.judge("user2", 2, Rating::Positive).await;

        let connections = h.store.connections_of("user2");
        let to_user1 = connections.iter().find(|c| c.publisher().id == "user1").unwrap();
        let to_user3 = connections.iter().find(|c| c.publisher().id == "user3").unwrap();
        assert_eq!(to_user1.top_sources, vec![1]);
        assert_eq!(to_user3.num_shared_items, 0);
    }

    #[tokio::test]
    async fn test_decay_never_reaches_zero() {
        let h = Harness::new();
        h.judge("user1", 1, Rating::Positive).await;
        h.judge("user2", 1, Rating::Positive).await;
        let before = h.weight("user2", "user1", Polarity::Positive).await;

        let decayed = h
            .trainer
            .decay_connection_weight_to_publisher(&Source::user("user1", None), 10_000)
            .await
            .unwrap();
        assert_eq!(decayed, 1);

        let after = h.weight("user2", "user1", Polarity::Positive).await;
        assert!(after > 0.0);
        assert!(after < before);
    }

    #[test]
    fn test_decayed_weight_stays_above_neutral() {
        let trainer =
            ConnectionTrainer::new(Arc::new(MemoryStore::default()), TrainerConfig::default()).unwrap();
        for weight in [1e-12, 0.001, 0.5, 3.0, 40.0] {
            let once = trainer.decayed_weight(weight, 1);
            assert!(once > 0.0 && once < weight);
            assert!(trainer.decayed_weight(weight, 1_000_000) > 0.0);
        }
        assert_eq!(trainer.decayed_weight(0.0, 5), 0.0);
    }

    #[tokio::test]
    async fn test_neutral_judgments_never_change_weights() {
        let h = Harness::new();
        let users = ["a", "b", "c", "d", "e"];
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..300 {
            let user = users[rng.gen_range(0..users.len())];
            let item = rng.gen_range(0..12u64);
            let rating = Rating::try_from(rng.gen_range(-1..=1i64)).unwrap();

            let before = h.snapshot(&users);
            let summary = h.judge(user, item, rating).await;
            if rating.is_neutral() {
                assert_eq!(summary, TrainingSummary::default());
                assert_eq!(before, h.snapshot(&users));
            }
        }
    }

    struct UnavailableStore;

    #[async_trait]
    impl ConnectionStore for UnavailableStore {
        async fn get_weight(&self, _: &Source, _: &Source, _: Polarity) -> Result<f64, StoreError> {
            Ok(0.0)
        }

        async fn set_weight(&self, _: WeightWrite) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connections offline".to_string()))
        }

        async fn prior_judgments(
            &self,
            _: ItemId,
            _: &Source,
            _: Rating,
        ) -> Result<Vec<PriorJudgment>, StoreError> {
            Ok(vec![PriorJudgment {
                publisher: Source::user("user1", None),
                rating: Rating::Positive,
                weight: 0.0,
                ranks_since_shared: 0,
            }])
        }

        async fn subscribers(&self, _: &Source, _: Polarity) -> Result<Vec<Subscription>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_store_failure_aborts_unit() {
        let trainer =
            ConnectionTrainer::new(Arc::new(UnavailableStore), TrainerConfig::default()).unwrap();
        let err = trainer
            .judgment_added(&Source::user("user2", None), 1, Rating::Positive)
            .await
            .unwrap_err();
        assert!(matches!(err, TrainError::Store(StoreError::Unavailable(_))));
        assert!(err.is_transient());
    }

    /// Never answers prior-judgment reads
    struct HungStore;

    #[async_trait]
    impl ConnectionStore for HungStore {
        async fn get_weight(&self, _: &Source, _: &Source, _: Polarity) -> Result<f64, StoreError> {
            Ok(0.0)
        }

        async fn set_weight(&self, _: WeightWrite) -> Result<(), StoreError> {
            Ok(())
        }

        async fn prior_judgments(
            &self,
            _: ItemId,
            _: &Source,
            _: Rating,
        ) -> Result<Vec<PriorJudgment>, StoreError> {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }

        async fn subscribers(&self, _: &Source, _: Polarity) -> Result<Vec<Subscription>, StoreError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_hung_store_times_out_as_transient() {
        let config = TrainerConfig::default().with_store_timeout_ms(20);
        let trainer = ConnectionTrainer::new(Arc::new(HungStore), config).unwrap();
        let source = Source::user("user3", None);

        let training = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            trainer.judgment_added(&source, 1, Rating::Positive),
        )
        .await
        .expect("training must not block past its store deadline");
        let err = training.unwrap_err();
        assert!(matches!(err, TrainError::Store(StoreError::Timeout(20))));
        assert!(err.is_transient());

        let decay = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            trainer.decay_connection_weight_to_publisher(&source, 3),
        )
        .await
        .expect("decay must not block past its store deadline");
        assert!(matches!(decay, Err(TrainError::Store(StoreError::Timeout(20)))));
    }

    #[test]
    fn test_recency_discount() {
        let trainer =
            ConnectionTrainer::new(Arc::new(MemoryStore::default()), TrainerConfig::default()).unwrap();
        let prior = |ranks| PriorJudgment {
            publisher: Source::user("user1", None),
            rating: Rating::Positive,
            weight: 0.0,
            ranks_since_shared: ranks,
        };
        let subscriber = Source::user("user2", None);
        let fresh = trainer.training_writes(&subscriber, 1, Rating::Positive, &[prior(0)]);
        let stale = trainer.training_writes(&subscriber, 1, Rating::Positive, &[prior(3)]);
        let expected = fresh[0].weight * 0.9f64.powi(3);
        assert!((stale[0].weight - expected).abs() < 1e-12);
    }
}
