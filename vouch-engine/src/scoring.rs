//! Candidate scoring
//!
//! Runs single-threaded over candidates that were fetched concurrently.
//! Both streams are processed newest first so per-source decay gives a
//! source's most recent item the full connection weight.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};

use vouch_core::{
    CategoryId, Connection, ConnectionKey, FeedItem, ItemId, Judgment, Recommendation, SourcePage,
};

/// Items a request must not return
#[derive(Debug, Clone, Default)]
pub struct Exclusions {
    /// Caller-excluded items
    pub items: HashSet<ItemId>,
    /// Items the subscriber already judged
    pub rated: HashSet<ItemId>,
    /// Items already shown in the past-recommendation scope
    pub past: HashSet<ItemId>,
}

#[derive(Debug, Clone, Copy)]
pub struct ScoringParams {
    /// Constant weight of every endorsement (0 unless popular items are wanted)
    pub nominal_weight: f64,
    pub decay_rate: f64,
    pub max_top_sources: usize,
    pub max_top_feeds: usize,
}

/// Counters reported after scoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoringStats {
    pub judgments_matched_past: usize,
    pub feed_items_matched_past: usize,
    pub candidates: usize,
}

/// A positive connection to a feed, merged across subscriber categories
#[derive(Debug, Clone, PartialEq)]
pub struct FeedConnection {
    pub feed_url: String,
    pub weight: f64,
    pub category: Option<CategoryId>,
    pub key: ConnectionKey,
}

/// Usable feed connections: positive, updated inside the window, one per feed
///
/// Connections to the same feed from several subscriber categories are
/// summed into the first (strongest) one.
pub fn merge_feed_connections(
    connections: &[Connection],
    since: Option<DateTime<Utc>>,
) -> Vec<FeedConnection> {
    let mut merged: Vec<FeedConnection> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for connection in connections {
        if !connection.publisher().is_feed() || !connection.is_positive() || connection.weight <= 0.0 {
            continue;
        }
        // Weights are rewritten whenever a feed publishes, so a connection
        // untouched inside the window has nothing new to offer.
        if since.is_some_and(|since| connection.updated_at < since) {
            continue;
        }
        let feed_url = connection.publisher().id.as_str();
        match index.get(feed_url) {
            Some(&i) => merged[i].weight += connection.weight,
            None => {
                index.insert(feed_url, merged.len());
                merged.push(FeedConnection {
                    feed_url: feed_url.to_string(),
                    weight: connection.weight,
                    category: connection.subscriber().category,
                    key: connection.key.clone(),
                });
            }
        }
    }
    merged
}

#[derive(Debug)]
struct Candidate {
    recommendation: Recommendation,
    top_sources: BTreeMap<ItemId, SourcePage>,
    /// (feed url, connection weight)
    feeds: Vec<(String, f64)>,
}

impl Candidate {
    fn new(item: ItemId, category: Option<CategoryId>, first_seen: DateTime<Utc>) -> Self {
        Self {
            recommendation: Recommendation::new(item, category, first_seen),
            top_sources: BTreeMap::new(),
            feeds: Vec::new(),
        }
    }

    fn seen_at(&mut self, at: DateTime<Utc>) {
        let first_seen = &mut self.recommendation.first_seen;
        *first_seen = (*first_seen).min(at);
    }

    fn finish(mut self, params: &ScoringParams) -> Recommendation {
        let mut pages: Vec<SourcePage> = self.top_sources.into_values().collect();
        self.recommendation.source_count = pages.len();
        pages.sort_by(|a, b| b.weight.total_cmp(&a.weight).then(a.item.cmp(&b.item)));
        pages.truncate(params.max_top_sources);
        self.recommendation.top_sources = pages;

        self.feeds.sort_by(|a, b| b.1.total_cmp(&a.1));
        let mut unique: Vec<String> = Vec::new();
        for (url, _) in self.feeds {
            if !unique.contains(&url) {
                unique.push(url);
            }
        }
        self.recommendation.feed_count = unique.len();
        unique.truncate(params.max_top_feeds);
        self.recommendation.top_feed_urls = unique;
        self.recommendation
    }
}

type CandidateKey = (ItemId, Option<CategoryId>);

/// (publisher id, publisher category)
type SourceKey = (String, Option<CategoryId>);

/// Accumulates trust-weighted scores per (item, subscriber category)
pub struct CandidateScorer<'a> {
    params: ScoringParams,
    exclusions: &'a Exclusions,
    candidates: HashMap<CandidateKey, Candidate>,
    stats: ScoringStats,
}

impl<'a> CandidateScorer<'a> {
    pub fn new(params: ScoringParams, exclusions: &'a Exclusions) -> Self {
        Self {
            params,
            exclusions,
            candidates: HashMap::new(),
            stats: ScoringStats::default(),
        }
    }

    fn candidate(
        &mut self,
        item: ItemId,
        category: Option<CategoryId>,
        at: DateTime<Utc>,
    ) -> &mut Candidate {
        let candidate = self
            .candidates
            .entry((item, category))
            .or_insert_with(|| Candidate::new(item, category, at));
        candidate.seen_at(at);
        candidate
    }

    /// Score judgments by other users, newest first
    ///
    /// `connections` are the subscriber's user connections, strongest first.
    pub fn score_judgments(
        &mut self,
        subscriber_id: &str,
        judgments: &[Judgment],
        connections: &[Connection],
    ) {
        let is_own = |j: &Judgment| j.source.is_user() && j.source.id == subscriber_id;
        let source_of = |j: &Judgment| -> SourceKey { (j.source.id.clone(), j.source.category) };

        let mut positive_sources: HashSet<SourceKey> = HashSet::new();
        let mut negative_sources: HashSet<SourceKey> = HashSet::new();
        for j in judgments {
            if j.rating.is_neutral()
                || self.exclusions.past.contains(&j.item)
                || self.exclusions.items.contains(&j.item)
                || is_own(j)
            {
                continue;
            }
            if j.rating.is_positive() {
                positive_sources.insert(source_of(j));
            } else {
                negative_sources.insert(source_of(j));
            }
        }

        // A subscriber may follow the same source from several categories;
        // only the strongest connection counts.
        let mut positive_connections: HashMap<SourceKey, &Connection> = HashMap::new();
        let mut negative_connections: HashMap<SourceKey, &Connection> = HashMap::new();
        for connection in connections {
            let source = (connection.publisher().id.clone(), connection.publisher().category);
            let (sources, chosen) = if connection.is_positive() {
                (&positive_sources, &mut positive_connections)
            } else {
                (&negative_sources, &mut negative_connections)
            };
            if sources.contains(&source) {
                chosen.entry(source).or_insert(connection);
            }
        }

        let nominal = self.params.nominal_weight;
        let decay_rate = self.params.decay_rate;
        let mut seen_from_source: HashMap<SourceKey, i32> = HashMap::new();

        for j in judgments {
            if j.rating.is_neutral() {
                continue;
            }
            if self.exclusions.past.contains(&j.item) {
                self.stats.judgments_matched_past += 1;
                continue;
            }
            if self.exclusions.items.contains(&j.item)
                || self.exclusions.rated.contains(&j.item)
                || is_own(j)
            {
                continue;
            }
            let positive = j.rating.is_positive();
            let source = source_of(j);
            let connection = if positive {
                positive_connections.get(&source).copied()
            } else {
                negative_connections.get(&source).copied()
            };
            let category = connection.and_then(|c| c.subscriber().category);

            let mut weight = nominal;
            let mut contributing = None;
            let mut shared_pages: &[ItemId] = &[];
            if let Some(connection) = connection {
                let mut connection_weight = connection.weight;
                if positive && connection_weight > 0.0 {
                    shared_pages = &connection.top_sources;
                    contributing = Some(connection.key.clone());
                }
                // A publisher that never endorsed anything the subscriber
                // endorsed only gets the nominal weight.
                if !(positive && connection.num_shared_items == 0) {
                    let seen = seen_from_source.entry(source).or_insert(0);
                    connection_weight *= decay_rate.powi(*seen);
                    *seen += 1;
                    weight += connection_weight;
                }
                if contributing.is_some() {
                    let candidate = self.candidate(j.item, category, j.timestamp);
                    for page in shared_pages {
                        let entry = candidate
                            .top_sources
                            .entry(*page)
                            .or_insert_with(|| SourcePage::new(*page));
                        entry.weight += connection.weight;
                        entry.user_count += 1;
                    }
                }
            }

            let candidate = self.candidate(j.item, category, j.timestamp);
            if let Some(key) = contributing {
                candidate.recommendation.contributing.push(key);
            }
            if weight > 0.0 {
                candidate.recommendation.weight += j.rating.as_f64() * weight;
                if positive {
                    candidate.recommendation.user_count += 1;
                }
            }
        }
    }

    /// Score items published by feeds the subscriber trusts
    pub fn score_feed_items(&mut self, mut items: Vec<FeedItem>, connections: &[FeedConnection]) {
        let by_url: HashMap<&str, &FeedConnection> =
            connections.iter().map(|c| (c.feed_url.as_str(), c)).collect();
        items.sort_by(|a, b| b.published_at.cmp(&a.published_at));

        let decay_rate = self.params.decay_rate;
        let mut seen_from_feed: HashMap<&str, i32> = HashMap::new();
        for item in &items {
            if self.exclusions.rated.contains(&item.item) {
                continue;
            }
            if self.exclusions.past.contains(&item.item) {
                self.stats.feed_items_matched_past += 1;
                continue;
            }
            let Some(connection) = by_url.get(item.feed_url.as_str()).copied() else {
                continue;
            };
            // Excluded items still count toward the feed's decay.
            let seen = seen_from_feed.entry(connection.feed_url.as_str()).or_insert(0);
            let decay = decay_rate.powi(*seen);
            *seen += 1;
            if self.exclusions.items.contains(&item.item) {
                continue;
            }

            let candidate = self.candidate(item.item, connection.category, item.published_at);
            candidate
                .feeds
                .push((connection.feed_url.clone(), connection.weight));
            candidate.recommendation.weight += connection.weight * decay;
            candidate.recommendation.contributing.push(connection.key.clone());
        }
    }

    /// Ranked, deduplicated recommendations with a positive score
    ///
    /// Ordered by weight, then most recently first seen, then item id.
    pub fn finish(self) -> (Vec<Recommendation>, ScoringStats) {
        let mut stats = self.stats;
        stats.candidates = self.candidates.len();
        let params = self.params;

        let mut ranked: Vec<Recommendation> = self
            .candidates
            .into_values()
            .map(|c| c.finish(&params))
            .filter(|r| r.weight > 0.0)
            .collect();
        ranked.sort_by(|a, b| {
            b.weight
                .total_cmp(&a.weight)
                .then(b.first_seen.cmp(&a.first_seen))
                .then(a.item.cmp(&b.item))
                .then(a.category.cmp(&b.category))
        });

        // The same item may have been scored under several categories.
        let mut seen = HashSet::new();
        ranked.retain(|r| seen.insert(r.item));
        (ranked, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use vouch_core::{Polarity, Rating, Source, LOGISTIC_REGRESSION_CONNECTION};

    fn params() -> ScoringParams {
        ScoringParams {
            nominal_weight: 0.0,
            decay_rate: 1.0,
            max_top_sources: 10,
            max_top_feeds: 10,
        }
    }

    fn connection(publisher: Source, weight: f64, shared: u32, now: DateTime<Utc>) -> Connection {
        let key = ConnectionKey::new(
            Source::user("carol", None),
            publisher,
            Polarity::Positive,
            LOGISTIC_REGRESSION_CONNECTION,
        );
        let mut c = Connection::new(key, weight, now, Some(now), now);
        c.num_shared_items = shared;
        c.top_sources = (100..100 + shared as u64).collect();
        c
    }

    fn judgment(user: &str, item: ItemId, rating: Rating, at: DateTime<Utc>) -> Judgment {
        Judgment::new(Source::user(user, None), item, rating, at)
    }

    #[test]
    fn test_unshared_publisher_gets_only_nominal_weight() {
        let now = Utc::now();
        let exclusions = Exclusions::default();
        let connections = vec![
            connection(Source::user("alice", None), 0.4, 2, now),
            connection(Source::user("bob", None), 0.9, 0, now),
        ];
        let judgments = vec![
            judgment("alice", 1, Rating::Positive, now),
            judgment("bob", 2, Rating::Positive, now),
        ];

        let mut scorer = CandidateScorer::new(params(), &exclusions);
        scorer.score_judgments("carol", &judgments, &connections);
        let (ranked, _) = scorer.finish();

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].item, 1);
        assert_eq!(ranked[0].weight, 0.4);
        assert_eq!(ranked[0].user_count, 1);
        assert_eq!(ranked[0].source_count, 2);
        assert_eq!(ranked[0].top_sources[0].weight, 0.4);
    }

    #[test]
    fn test_popular_items_use_nominal_weight() {
        let now = Utc::now();
        let exclusions = Exclusions::default();
        let judgments = vec![
            judgment("alice", 1, Rating::Positive, now),
            judgment("bob", 1, Rating::Positive, now - Duration::minutes(1)),
            judgment("bob", 2, Rating::Positive, now - Duration::minutes(2)),
            judgment("dave", 3, Rating::Negative, now),
        ];
        let mut p = params();
        p.nominal_weight = 0.0001;

        let mut scorer = CandidateScorer::new(p, &exclusions);
        scorer.score_judgments("carol", &judgments, &[]);
        let (ranked, _) = scorer.finish();

        let items: Vec<ItemId> = ranked.iter().map(|r| r.item).collect();
        assert_eq!(items, vec![1, 2]);
        assert_eq!(ranked[0].user_count, 2);
        assert_eq!(ranked[0].first_seen, now - Duration::minutes(1));
    }

    #[test]
    fn test_equal_weight_and_age_rank_by_item_id() {
        let now = Utc::now();
        let exclusions = Exclusions::default();
        let connections = vec![
            connection(Source::user("alice", None), 0.5, 1, now),
            connection(Source::user("bob", None), 0.5, 1, now),
        ];
        let judgments = vec![
            judgment("alice", 9, Rating::Positive, now),
            judgment("bob", 4, Rating::Positive, now),
        ];

        let mut scorer = CandidateScorer::new(params(), &exclusions);
        scorer.score_judgments("carol", &judgments, &connections);
        let (ranked, _) = scorer.finish();

        assert_eq!(ranked[0].weight, ranked[1].weight);
        assert_eq!(ranked[0].first_seen, ranked[1].first_seen);
        assert_eq!(ranked.iter().map(|r| r.item).collect::<Vec<_>>(), vec![4, 9]);
    }

    #[test]
    fn test_decay_per_source_newest_first() {
        let now = Utc::now();
        let exclusions = Exclusions::default();
        let connections = vec![connection(Source::user("alice", None), 0.5, 1, now)];
        let judgments = vec![
            judgment("alice", 3, Rating::Positive, now),
            judgment("alice", 2, Rating::Positive, now - Duration::minutes(1)),
            judgment("alice", 1, Rating::Positive, now - Duration::minutes(2)),
        ];
        let mut p = params();
        p.decay_rate = 0.5;

        let mut scorer = CandidateScorer::new(p, &exclusions);
        scorer.score_judgments("carol", &judgments, &connections);
        let (ranked, _) = scorer.finish();

        let weights: Vec<f64> = ranked.iter().map(|r| r.weight).collect();
        assert_eq!(weights, vec![0.5, 0.25, 0.125]);
    }

    #[test]
    fn test_exclusions_and_past_counter() {
        let now = Utc::now();
        let exclusions = Exclusions {
            items: HashSet::from([1]),
            rated: HashSet::from([2]),
            past: HashSet::from([3]),
        };
        let connections = vec![connection(Source::user("alice", None), 0.5, 1, now)];
        let judgments: Vec<Judgment> = (1..=4)
            .map(|item| judgment("alice", item, Rating::Positive, now))
            .chain([judgment("carol", 5, Rating::Positive, now)])
            .collect();

        let mut scorer = CandidateScorer::new(params(), &exclusions);
        scorer.score_judgments("carol", &judgments, &connections);
        let (ranked, stats) = scorer.finish();

        assert_eq!(ranked.iter().map(|r| r.item).collect::<Vec<_>>(), vec![4]);
        assert_eq!(stats.judgments_matched_past, 1);
    }

    #[test]
    fn test_feed_items_decay_and_presentation() {
        let now = Utc::now();
        let exclusions = Exclusions {
            items: HashSet::from([11]),
            ..Exclusions::default()
        };
        let feed = |url: &str, weight| FeedConnection {
            feed_url: url.to_string(),
            weight,
            category: None,
            key: ConnectionKey::new(
                Source::user("carol", None),
                Source::feed(url),
                Polarity::Positive,
                LOGISTIC_REGRESSION_CONNECTION,
            ),
        };
        let connections = vec![feed("http://a.test/rss", 0.8), feed("http://b.test/rss", 0.2)];
        let item = |item, url: &str, minutes| FeedItem {
            item,
            feed_url: url.to_string(),
            published_at: now - Duration::minutes(minutes),
        };
        let items = vec![
            item(10, "http://a.test/rss", 3),
            item(11, "http://a.test/rss", 2),
            item(12, "http://a.test/rss", 1),
            item(10, "http://b.test/rss", 5),
        ];
        let mut p = params();
        p.decay_rate = 0.5;

        let mut scorer = CandidateScorer::new(p, &exclusions);
        scorer.score_feed_items(items, &connections);
        let (ranked, _) = scorer.finish();

        // 12 is newest (full weight), 11 is excluded but still decays 10.
        assert_eq!(ranked[0].item, 12);
        assert_eq!(ranked[0].weight, 0.8);
        let shared = ranked.iter().find(|r| r.item == 10).unwrap();
        assert_eq!(shared.weight, 0.8 * 0.25 + 0.2);
        assert_eq!(shared.top_feed_urls, vec!["http://a.test/rss", "http://b.test/rss"]);
        assert_eq!(shared.feed_count, 2);
        assert_eq!(shared.contributing.len(), 2);
    }

    #[test]
    fn test_merge_feed_connections() {
        let now = Utc::now();
        let key = |category| {
            ConnectionKey::new(
                Source::user("carol", category),
                Source::feed("http://a.test/rss"),
                Polarity::Positive,
                LOGISTIC_REGRESSION_CONNECTION,
            )
        };
        let mut stale = Connection::new(key(Some(9)), 1.0, now, None, now - Duration::days(3));
        stale.updated_at = now - Duration::days(3);
        let connections = vec![
            Connection::new(key(None), 0.5, now, None, now),
            Connection::new(key(Some(1)), 0.25, now, None, now),
            Connection::new(key(Some(2)), -0.3, now, None, now),
            stale,
        ];

        let merged = merge_feed_connections(&connections, Some(now - Duration::days(1)));
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].weight, 0.75);
        assert_eq!(merged[0].category, None);
    }

    #[test]
    fn test_dedup_keeps_best_category() {
        let now = Utc::now();
        let exclusions = Exclusions::default();
        let mut strong = connection(Source::user("alice", None), 0.6, 1, now);
        strong.key.subscriber = Source::user("carol", Some(1));
        let mut weak = connection(Source::user("bob", None), 0.2, 1, now);
        weak.key.subscriber = Source::user("carol", Some(2));
        let judgments = vec![
            judgment("alice", 7, Rating::Positive, now),
            judgment("bob", 7, Rating::Positive, now),
        ];

        let mut scorer = CandidateScorer::new(params(), &exclusions);
        scorer.score_judgments("carol", &judgments, &[strong, weak]);
        let (ranked, stats) = scorer.finish();

        assert_eq!(stats.candidates, 2);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].category, Some(1));
    }
}
