//! Recommendation records produced by the engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::{CategoryId, ConnectionKey, ItemId};

/// An item the subscriber shares with the publishers behind a recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcePage {
    pub item: ItemId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub weight: f64,
    pub user_count: u32,
}

impl SourcePage {
    pub fn new(item: ItemId) -> Self {
        Self {
            item,
            url: None,
            weight: 0.0,
            user_count: 0,
        }
    }
}

/// A ranked candidate item for a subscriber
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub item: ItemId,

    /// Resolved after ranking
    pub destination_url: Option<String>,

    /// Subscriber category the recommendation was scored under
    pub category: Option<CategoryId>,

    /// Aggregate trust-weighted score
    pub weight: f64,

    /// Positive user judgments that contributed
    pub user_count: u32,

    /// Co-endorsed items behind the recommendation
    pub top_sources: Vec<SourcePage>,
    pub source_count: usize,

    pub top_feed_urls: Vec<String>,
    pub feed_count: usize,

    /// Earliest judgment or publication inside the window
    pub first_seen: DateTime<Utc>,

    /// Connections that contributed; drives diversification
    #[serde(skip)]
    pub contributing: Vec<ConnectionKey>,
}

impl Recommendation {
    pub fn new(item: ItemId, category: Option<CategoryId>, first_seen: DateTime<Utc>) -> Self {
        Self {
            item,
            destination_url: None,
            category,
            weight: 0.0,
            user_count: 0,
            top_sources: Vec::new(),
            source_count: 0,
            top_feed_urls: Vec::new(),
            feed_count: 0,
            first_seen,
            contributing: Vec::new(),
        }
    }

    /// Order-independent signature of the contributing connection set.
    ///
    /// XOR over distinct key signatures; an empty set maps to 0.
    pub fn connections_signature(&self) -> u64 {
        self.contributing
            .iter()
            .map(ConnectionKey::signature)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .fold(0, |acc, sig| acc ^ sig)
    }
}
