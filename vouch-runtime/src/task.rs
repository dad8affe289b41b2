//! Deferred work items

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use vouch_core::{ItemId, Rating, Source, TimePeriod};
use vouch_engine::TrainError;
use vouch_store::StoreError;

/// A unit of deferred work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Task {
    /// Train the judging source's connections
    JudgmentAdded {
        source: Source,
        item: ItemId,
        rating: Rating,
    },
    /// Decay trust in a publisher that published `num_items` new items
    DecayPublisher { publisher: Source, num_items: u32 },
    /// Commit recommendations saved at `saved_at` as past ones
    CommitPastRecommendations {
        user_id: String,
        time_period: TimePeriod,
        saved_at: DateTime<Utc>,
    },
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::JudgmentAdded { source, item, rating } => {
                write!(f, "judgment {} of item {} by {}", rating.value(), item, source)
            }
            Task::DecayPublisher { publisher, num_items } => {
                write!(f, "decay of {} over {} items", publisher, num_items)
            }
            Task::CommitPastRecommendations { user_id, time_period, .. } => {
                write!(f, "commit of {} recommendations for {}", time_period, user_id)
            }
        }
    }
}

/// A task as delivered by the queue
#[derive(Debug, Clone, PartialEq)]
pub struct TaskEnvelope {
    pub id: Uuid,
    /// Zero-based delivery attempt
    pub attempt: u32,
    pub task: Task,
}

impl TaskEnvelope {
    pub fn new(task: Task) -> Self {
        Self {
            id: Uuid::new_v4(),
            attempt: 0,
            task,
        }
    }

    pub fn retry(self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self
        }
    }
}

/// Errors from task handlers
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Training failed: {0}")]
    Train(#[from] TrainError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl TaskError {
    pub fn is_transient(&self) -> bool {
        match self {
            TaskError::Train(e) => e.is_transient(),
            TaskError::Store(e) => e.is_transient(),
        }
    }
}
