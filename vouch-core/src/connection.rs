//! Connections - learned, directional, polarity-specific trust
//!
//! A connection answers "how predictive of the subscriber's taste are the
//! publisher's positive (or negative) judgments". Weights live on the logit
//! scale: 0 is neutral, positive means the publisher's judgments of that
//! polarity tend to agree with the subscriber.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::{ItemId, Rating, Source};

/// Activity buckets (in days) pre-computed for every connection
pub const CONNECTION_ACTIVE_DAYS: [u32; 6] = [1, 3, 7, 14, 30, 60];

/// Which of the publisher's judgments a connection trusts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Positive,
    Negative,
}

impl Polarity {
    /// Polarity of the connection a judgment trains; `None` for neutral
    pub fn of(rating: Rating) -> Option<Self> {
        match rating {
            Rating::Positive => Some(Polarity::Positive),
            Rating::Negative => Some(Polarity::Negative),
            Rating::Neutral => None,
        }
    }

    pub fn is_positive(&self) -> bool {
        *self == Polarity::Positive
    }
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Polarity::Positive => f.write_str("+"),
            Polarity::Negative => f.write_str("-"),
        }
    }
}

/// Identity of a connection. At most one record exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionKey {
    pub subscriber: Source,
    pub publisher: Source,
    pub polarity: Polarity,
    pub version: String,
}

impl ConnectionKey {
    pub fn new(
        subscriber: Source,
        publisher: Source,
        polarity: Polarity,
        version: impl Into<String>,
    ) -> Self {
        Self {
            subscriber,
            publisher,
            polarity,
            version: version.into(),
        }
    }

    /// Stable 64-bit hash of the key, identical across processes
    pub fn signature(&self) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(self.to_string().as_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(bytes)
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} ({}) @{}",
            self.subscriber, self.publisher, self.polarity, self.version
        )
    }
}

/// A persisted trust record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub key: ConnectionKey,

    /// Logit-scale weight, only ever moved by the trainer
    pub weight: f64,

    /// How many items both sides endorsed
    pub num_shared_items: u32,

    /// Most recent co-endorsed items, newest first
    pub top_sources: Vec<ItemId>,

    /// Backdated creation time; feed decay is suppressed shortly after it
    pub subscription_start: DateTime<Utc>,

    /// Last time the publisher published or judged anything
    pub active_at: Option<DateTime<Utc>>,

    pub updated_at: DateTime<Utc>,
}

impl Connection {
    pub fn new(
        key: ConnectionKey,
        weight: f64,
        subscription_start: DateTime<Utc>,
        active_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            weight,
            num_shared_items: 0,
            top_sources: Vec::new(),
            subscription_start,
            active_at,
            updated_at: now,
        }
    }

    pub fn publisher(&self) -> &Source {
        &self.key.publisher
    }

    pub fn subscriber(&self) -> &Source {
        &self.key.subscriber
    }

    pub fn is_positive(&self) -> bool {
        self.key.polarity.is_positive()
    }

    /// Whether the publisher was active within the last `days` days
    pub fn is_active_within(&self, days: u32, now: DateTime<Utc>) -> bool {
        match self.active_at {
            Some(active_at) => now - active_at < Duration::days(days as i64),
            None => false,
        }
    }

    /// All activity buckets this connection currently belongs to
    pub fn active_days(&self, now: DateTime<Utc>) -> Vec<u32> {
        CONNECTION_ACTIVE_DAYS
            .iter()
            .copied()
            .filter(|days| self.is_active_within(*days, now))
            .collect()
    }

    /// Record an item both sides endorsed
    pub fn record_shared_item(&mut self, item: ItemId, max_top_sources: usize) {
        self.num_shared_items += 1;
        self.top_sources.insert(0, item);
        self.top_sources.truncate(max_top_sources);
    }
}

/// A prior judge of an item, as seen by a new judgment of the same item
#[derive(Debug, Clone, PartialEq)]
pub struct PriorJudgment {
    pub publisher: Source,
    pub rating: Rating,
    /// The judging source's current trust in this publisher
    pub weight: f64,
    /// How many other judgments the publisher made after this one
    pub ranks_since_shared: u32,
}

/// A subscriber holding a connection to some publisher
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub subscriber: Source,
    pub weight: f64,
}
