//! Item registry - maps canonical urls to stable integer ids

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use vouch_core::ItemId;

/// Bidirectional url <-> id mapping. Ids start at 1 and are never reused.
#[derive(Debug)]
pub struct ItemRegistry {
    by_url: DashMap<String, ItemId>,
    by_id: DashMap<ItemId, String>,
    next_id: AtomicU64,
}

impl ItemRegistry {
    pub fn new() -> Self {
        Self {
            by_url: DashMap::new(),
            by_id: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Id for `url`, allocating a new one on first sight
    pub fn get_or_insert(&self, url: &str) -> ItemId {
        if let Some(id) = self.by_url.get(url) {
            return *id;
        }
        let id = *self
            .by_url
            .entry(url.to_string())
            .or_insert_with(|| self.next_id.fetch_add(1, Ordering::Relaxed));
        self.by_id.entry(id).or_insert_with(|| url.to_string());
        id
    }

    pub fn id(&self, url: &str) -> Option<ItemId> {
        self.by_url.get(url).map(|id| *id)
    }

    pub fn url(&self, id: ItemId) -> Option<String> {
        self.by_id.get(&id).map(|url| url.clone())
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl Default for ItemRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_stable() {
        let registry = ItemRegistry::new();
        let a = registry.get_or_insert("http://a.test");
        let b = registry.get_or_insert("http://b.test");

        assert_ne!(a, b);
        assert_eq!(registry.get_or_insert("http://a.test"), a);
        assert_eq!(registry.url(b).as_deref(), Some("http://b.test"));
        assert_eq!(registry.id("http://c.test"), None);
        assert_eq!(registry.len(), 2);
    }
}
