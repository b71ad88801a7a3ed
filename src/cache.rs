//! Process-local TTL cache for JSON responses.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// Entry count above which expired entries are swept on insert
const SWEEP_THRESHOLD: usize = 1024;

pub const STORY_LIST_PREFIX: &str = "stories:list:";

pub fn story_list_key(query: &str) -> String {
    format!("{STORY_LIST_PREFIX}{query}")
}

pub fn story_key(slug: &str) -> String {
    format!("story:{slug}")
}

struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

/// Shared TTL cache keyed by string
#[derive(Clone)]
pub struct ResponseCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Get a live entry
    pub async fn get(&self, key: &str) -> Option<Value> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone())
    }

    pub async fn insert(&self, key: impl Into<String>, value: Value) {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        if entries.len() >= SWEEP_THRESHOLD {
            entries.retain(|_, entry| entry.expires_at > now);
        }
        entries.insert(
            key.into(),
            CacheEntry {
                value,
                expires_at: now + self.ttl,
            },
        );
    }

    pub async fn invalidate(&self, key: &str) {
        self.entries.write().await.remove(key);
    }

    /// Remove every entry whose key starts with `prefix`
    pub async fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        before - entries.len()
    }

    /// Drop the cached detail of a story together with every story listing
    pub async fn invalidate_story(&self, slug: &str) {
        self.invalidate(&story_key(slug)).await;
        let removed = self.invalidate_prefix(STORY_LIST_PREFIX).await;
        debug!("Invalidated cache for story {} ({} listings)", slug, removed);
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_insert_and_get() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        cache.insert("a", json!({"n": 1})).await;
        assert_eq!(cache.get("a").await, Some(json!({"n": 1})));
        assert_eq!(cache.get("b").await, None);
    }

    #[tokio::test]
    async fn test_expired_entries_are_misses() {
        let cache = ResponseCache::new(Duration::ZERO);
        cache.insert("a", json!(1)).await;
        assert_eq!(cache.get("a").await, None);
    }

    #[tokio::test]
    async fn test_invalidate_story_clears_listings() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        cache.insert(story_key("tale"), json!("detail")).await;
        cache.insert(story_key("other"), json!("detail")).await;
        cache.insert(story_list_key("page=1"), json!([])).await;
        cache.insert(story_list_key("page=2"), json!([])).await;

        cache.invalidate_story("tale").await;

        assert!(cache.get(&story_key("tale")).await.is_none());
        assert!(cache.get(&story_list_key("page=1")).await.is_none());
        assert!(cache.get(&story_key("other")).await.is_some());
        assert_eq!(cache.len().await, 1);
    }
}
