//! Past recommendations - what a user has already been shown
//!
//! Saved pages start uncommitted. A commit after a quiet period turns every
//! uncommitted entry of that user and period into one session, and only
//! committed entries are excluded from later requests.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use vouch_core::{ItemId, Recommendation, TimePeriod};

use crate::{SessionSummary, StoreError};

#[derive(Debug, Clone)]
struct PastEntry {
    item: ItemId,
    weight: f64,
    saved_at: DateTime<Utc>,
    committed: bool,
    session_number: Option<u32>,
    index_within_page: usize,
    serialized: String,
}

#[derive(Debug, Default)]
struct PastState {
    /// (user, period code, item) -> entry
    entries: HashMap<(String, u8, ItemId), PastEntry>,
    /// (user, period code or all) -> committed ids, newest last
    cache: HashMap<(String, Option<u8>), Vec<ItemId>>,
    sessions: Vec<SessionSummary>,
}

/// In-memory past recommendation log
#[derive(Debug)]
pub struct PastRecommendationLog {
    limit: usize,
    state: Mutex<PastState>,
}

impl PastRecommendationLog {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            state: Mutex::new(PastState::default()),
        }
    }

    pub fn save(
        &self,
        user_id: &str,
        period: TimePeriod,
        recommendations: &[Recommendation],
        saved_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let code = period.numeric();
        let mut serialized = Vec::with_capacity(recommendations.len());
        for r in recommendations {
            serialized.push(serde_json::to_string(r)?);
        }

        let mut state = self.state.lock();
        let mut replaced_committed = false;
        for (index, (r, blob)) in recommendations.iter().zip(serialized).enumerate() {
            let previous = state.entries.insert(
                (user_id.to_string(), code, r.item),
                PastEntry {
                    item: r.item,
                    weight: r.weight,
                    saved_at,
                    committed: false,
                    session_number: None,
                    index_within_page: index,
                    serialized: blob,
                },
            );
            replaced_committed |= previous.is_some_and(|e| e.committed);
        }
        // A re-shown item is uncommitted again until the next commit.
        if replaced_committed {
            state.cache.remove(&(user_id.to_string(), Some(code)));
            state.cache.remove(&(user_id.to_string(), None));
        }
        debug!("Saved {} past recommendations for {}", recommendations.len(), user_id);
        Ok(())
    }

    pub fn commit(
        &self,
        user_id: &str,
        period: TimePeriod,
        saved_at: DateTime<Utc>,
    ) -> Option<SessionSummary> {
        let code = period.numeric();
        let mut state = self.state.lock();

        let mine = |key: &(String, u8, ItemId)| key.0 == user_id && key.1 == code;

        let newest_uncommitted = state
            .entries
            .iter()
            .filter(|(key, e)| mine(key) && !e.committed)
            .map(|(_, e)| e.saved_at)
            .max();
        // A later save schedules its own commit.
        if newest_uncommitted.is_some_and(|newest| newest > saved_at) {
            return None;
        }

        let next_session = state
            .entries
            .iter()
            .filter(|(key, e)| mine(key) && e.committed)
            .filter_map(|(_, e)| e.session_number)
            .max()
            .map_or(0, |n| n + 1);

        let mut weights = Vec::new();
        let mut new_items = Vec::new();
        for (key, entry) in state.entries.iter_mut() {
            if mine(key) && !entry.committed {
                entry.committed = true;
                entry.session_number = Some(next_session);
                weights.push(entry.weight);
                new_items.push((entry.saved_at, entry.item));
            }
        }
        if weights.is_empty() {
            return None;
        }

        weights.sort_by(|a, b| a.total_cmp(b));
        let summary = SessionSummary {
            user_id: user_id.to_string(),
            time_period: period,
            session_number: next_session,
            recommendation_count: weights.len(),
            median_weight: weights[weights.len() / 2],
            min_weight: weights[0],
            max_weight: weights[weights.len() - 1],
        };
        state.sessions.push(summary.clone());

        new_items.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
        let new_items: Vec<ItemId> = new_items.into_iter().map(|(_, item)| item).collect();
        for scope in [Some(code), None] {
            if let Some(cached) = state.cache.get_mut(&(user_id.to_string(), scope)) {
                for item in &new_items {
                    if !cached.contains(item) {
                        cached.push(*item);
                    }
                }
                let overflow = cached.len().saturating_sub(self.limit);
                cached.drain(..overflow);
            }
        }

        debug!(
            "Committed session {} with {} recommendations for {}",
            next_session, summary.recommendation_count, user_id
        );
        Some(summary)
    }

    pub fn item_ids(&self, user_id: &str, period: Option<TimePeriod>) -> HashSet<ItemId> {
        let scope = period.map(|p| p.numeric());
        let mut state = self.state.lock();
        let cache_key = (user_id.to_string(), scope);
        if let Some(cached) = state.cache.get(&cache_key) {
            return cached.iter().copied().collect();
        }

        let mut committed: Vec<(DateTime<Utc>, ItemId)> = state
            .entries
            .iter()
            .filter(|(key, e)| {
                key.0 == user_id && e.committed && scope.map_or(true, |code| key.1 == code)
            })
            .map(|(_, e)| (e.saved_at, e.item))
            .collect();
        committed.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));
        committed.truncate(self.limit);

        let mut ids: Vec<ItemId> = Vec::with_capacity(committed.len());
        for (_, item) in committed.into_iter().rev() {
            if !ids.contains(&item) {
                ids.push(item);
            }
        }
        let result = ids.iter().copied().collect();
        state.cache.insert(cache_key, ids);
        result
    }

    /// The most recently saved page for a user and period, in display order
    pub fn last_page(&self, user_id: &str, period: TimePeriod) -> Result<Vec<Recommendation>, StoreError> {
        let code = period.numeric();
        let state = self.state.lock();
        let newest = state
            .entries
            .iter()
            .filter(|(key, _)| key.0 == user_id && key.1 == code)
            .map(|(_, e)| e.saved_at)
            .max();
        let Some(newest) = newest else {
            return Ok(Vec::new());
        };

        let mut page: Vec<&PastEntry> = state
            .entries
            .iter()
            .filter(|(key, e)| key.0 == user_id && key.1 == code && e.saved_at == newest)
            .map(|(_, e)| e)
            .collect();
        page.sort_by_key(|e| e.index_within_page);

        let mut result = Vec::with_capacity(page.len());
        for entry in page {
            result.push(serde_json::from_str(&entry.serialized)?);
        }
        Ok(result)
    }

    pub fn sessions(&self, user_id: &str) -> Vec<SessionSummary> {
        self.state
            .lock()
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect()
    }
}
