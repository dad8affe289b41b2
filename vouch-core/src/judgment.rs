//! Judgments (ratings) that sources make about items

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Source, ValidationError};

/// Stable integer identity of an item (canonical url)
pub type ItemId = u64;

/// A source's judgment value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    Negative,
    Neutral,
    Positive,
}

impl Rating {
    /// Signed value in {-1, 0, 1}
    pub fn value(&self) -> i8 {
        match self {
            Rating::Negative => -1,
            Rating::Neutral => 0,
            Rating::Positive => 1,
        }
    }

    pub fn as_f64(&self) -> f64 {
        self.value() as f64
    }

    pub fn is_positive(&self) -> bool {
        *self == Rating::Positive
    }

    pub fn is_neutral(&self) -> bool {
        *self == Rating::Neutral
    }
}

impl TryFrom<i64> for Rating {
    type Error = ValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Rating::Negative),
            0 => Ok(Rating::Neutral),
            1 => Ok(Rating::Positive),
            other => Err(ValidationError::InvalidRating(other)),
        }
    }
}

/// A single judgment of an item by a source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Judgment {
    pub source: Source,
    pub item: ItemId,
    pub rating: Rating,
    pub timestamp: DateTime<Utc>,
}

impl Judgment {
    pub fn new(source: Source, item: ItemId, rating: Rating, timestamp: DateTime<Utc>) -> Self {
        Self {
            source,
            item,
            rating,
            timestamp,
        }
    }
}

/// An item published by a feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub item: ItemId,
    pub feed_url: String,
    pub published_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_conversion() {
        assert_eq!(Rating::try_from(1).unwrap(), Rating::Positive);
        assert_eq!(Rating::try_from(0).unwrap(), Rating::Neutral);
        assert_eq!(Rating::try_from(-1).unwrap(), Rating::Negative);
        assert_eq!(Rating::try_from(2), Err(ValidationError::InvalidRating(2)));
    }

    #[test]
    fn test_rating_values() {
        assert_eq!(Rating::Negative.as_f64(), -1.0);
        assert!(Rating::Positive.is_positive());
        assert!(Rating::Neutral.is_neutral());
    }
}
