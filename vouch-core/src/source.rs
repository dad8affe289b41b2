//! Sources of endorsements: people and syndicated feeds

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{validate_identifier, ValidationError};

/// Identifier of a user-defined category. `None` means the default category.
pub type CategoryId = u64;

/// Kinds of sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    User,
    Feed,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::User => "user",
            SourceType::Feed => "feed",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A producer (or consumer) of endorsements.
///
/// Identity for trust and candidate grouping is the full triple: the same
/// user in two categories is two sources.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Source {
    pub source_type: SourceType,
    /// User id, or feed url for feeds
    pub id: String,
    /// Always `None` for feeds
    pub category: Option<CategoryId>,
}

impl Source {
    pub fn user(id: impl Into<String>, category: Option<CategoryId>) -> Self {
        Self {
            source_type: SourceType::User,
            id: id.into(),
            category,
        }
    }

    pub fn feed(url: impl Into<String>) -> Self {
        Self {
            source_type: SourceType::Feed,
            id: url.into(),
            category: None,
        }
    }

    pub fn is_user(&self) -> bool {
        self.source_type == SourceType::User
    }

    pub fn is_feed(&self) -> bool {
        self.source_type == SourceType::Feed
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_identifier(&self.id)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.category {
            Some(category) => write!(f, "{}:{}#{}", self.source_type, self.id, category),
            None => write!(f, "{}:{}", self.source_type, self.id),
        }
    }
}
