//! Scenario files
//!
//! A scenario is an ordered list of events replayed against a fresh
//! in-memory store on a manual clock:
//!
//! ```toml
//! start = "2024-01-01T00:00:00Z"
//!
//! [[events]]
//! kind = "judge"
//! user = "alice"
//! url = "http://example.com/a"
//! rating = "positive"
//! ```

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use vouch_core::{CategoryId, Rating, Source, TimePeriod};
use vouch_engine::RecommendationRequest;
use vouch_runtime::Recommender;
use vouch_store::{ManualClock, MemoryStore};

use crate::settings::Settings;

fn default_step() -> i64 {
    1
}

fn default_period() -> TimePeriod {
    TimePeriod::Day
}

fn default_page_size() -> usize {
    20
}

/// One scenario event
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    /// Create a named category for a user
    Category { user: String, name: String },
    Judge {
        user: String,
        url: String,
        rating: Rating,
        /// Category name created by an earlier `category` event
        #[serde(default)]
        category: Option<String>,
        /// Minutes the clock moves before the event
        #[serde(default = "default_step")]
        after_minutes: i64,
    },
    Publish {
        feed: String,
        urls: Vec<String>,
        #[serde(default = "default_step")]
        after_minutes: i64,
    },
    /// An item page naming the feed it belongs to
    DeclareFeed { url: String, feed: String },
    /// A user opens their recommendations; the page shown is remembered
    Visit {
        user: String,
        #[serde(default = "default_period")]
        period: TimePeriod,
        #[serde(default = "default_page_size")]
        limit: usize,
        #[serde(default = "default_step")]
        after_minutes: i64,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Scenario {
    /// Clock start, current time when absent
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub events: Vec<Event>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// A store and service after all events have been applied
pub struct Replay {
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryStore>,
    pub recommender: Recommender,
    categories: HashMap<(String, String), CategoryId>,
}

impl Replay {
    /// Apply every event in file order, then wait for training to settle
    pub async fn run(scenario: &Scenario, settings: &Settings) -> Result<Self> {
        let clock = Arc::new(ManualClock::new(scenario.start.unwrap_or_else(Utc::now)));
        let store = Arc::new(MemoryStore::with_clock(settings.store.clone(), clock.clone()));
        let mut config = settings.recommender();
        // Scenario time only moves between events, so shown pages commit at once.
        config.runtime.commit_delay_secs = 0;
        let recommender = Recommender::in_memory(store.clone(), config)?;
        let mut replay = Self {
            clock,
            store,
            recommender,
            categories: HashMap::new(),
        };

        for (index, event) in scenario.events.iter().enumerate() {
            replay
                .apply(event)
                .await
                .with_context(|| format!("event {}", index + 1))?;
        }
        replay.recommender.drain().await;
        info!("Replayed {} events", scenario.events.len());
        Ok(replay)
    }

    async fn apply(&mut self, event: &Event) -> Result<()> {
        match event {
            Event::Category { user, name } => {
                let id = self.store.add_category(user, name);
                self.categories.insert((user.clone(), name.clone()), id);
                debug!("Category {} of {} is {}", name, user, id);
            }
            Event::Judge {
                user,
                url,
                rating,
                category,
                after_minutes,
            } => {
                self.clock.advance(Duration::minutes(*after_minutes));
                let category = match category {
                    Some(name) => Some(self.category(user, name)?),
                    None => None,
                };
                self.recommender
                    .add_judgment(Source::user(user.as_str(), category), url, *rating)
                    .await?;
                // Training sees the store as of this event.
                self.recommender.drain().await;
            }
            Event::Publish {
                feed,
                urls,
                after_minutes,
            } => {
                self.clock.advance(Duration::minutes(*after_minutes));
                self.recommender.publish_feed_items(feed, urls, None).await?;
                self.recommender.drain().await;
            }
            Event::DeclareFeed { url, feed } => {
                let item = self.store.items().get_or_insert(url);
                self.store.set_item_feed(item, feed);
            }
            Event::Visit {
                user,
                period,
                limit,
                after_minutes,
            } => {
                self.clock.advance(Duration::minutes(*after_minutes));
                let request = RecommendationRequest::new(user.as_str())
                    .with_time_period(*period)
                    .with_limit(*limit)
                    .any_category()
                    .save_past_recommendations()
                    .exclude_past_recommendations(false);
                let shown = self.recommender.recommend(&request).await?;
                debug!("{} was shown {} recommendations", user, shown.len());
                self.recommender.drain().await;
            }
        }
        Ok(())
    }

    /// Id of a category created by the scenario
    pub fn category(&self, user: &str, name: &str) -> Result<CategoryId> {
        match self.categories.get(&(user.to_string(), name.to_string())) {
            Some(id) => Ok(*id),
            None => bail!("user {} has no category named {}", user, name),
        }
    }
}
