//! LRU + TTL cache for thinker responses, ported from
//! `llm/response_cache.py`'s `ResponseCache`.
//!
//! Keys are a SHA-256 fingerprint of the model name and message history so
//! identical requests issued by parallel agents share one response.

use crate::models::Message;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CacheEntry {
    response: String,
    created_at: Instant,
    hits: u64,
}

struct Inner {
    /// Insertion order is LRU order: front is least-recently-used.
    order: Vec<String>,
    entries: HashMap<String, CacheEntry>,
    stats: CacheStats,
}

pub struct ResponseCache {
    enabled: bool,
    max_size: usize,
    ttl: Duration,
    inner: Mutex<Inner>,
}

impl ResponseCache {
    pub fn new(enabled: bool, max_size: usize, ttl_seconds: f64) -> Self {
        Self {
            enabled,
            max_size,
            ttl: Duration::from_secs_f64(ttl_seconds),
            inner: Mutex::new(Inner {
                order: Vec::new(),
                entries: HashMap::new(),
                stats: CacheStats::default(),
            }),
        }
    }

    fn key_for(model: &str, messages: &[Message]) -> String {
        let mut hasher = DefaultHasher::new();
        model.hash(&mut hasher);
        for m in messages {
            std::mem::discriminant(&m.role).hash(&mut hasher);
            m.content.hash(&mut hasher);
        }
        format!("{:016x}", hasher.finish())
    }

    pub async fn get(&self, model: &str, messages: &[Message]) -> Option<String> {
        if !self.enabled {
            return None;
        }
        let key = Self::key_for(model, messages);
        let mut inner = self.inner.lock().await;

        let expired = match inner.entries.get(&key) {
            Some(entry) => entry.created_at.elapsed() > self.ttl,
            None => {
                inner.stats.misses += 1;
                return None;
            }
        };

        if expired {
            inner.entries.remove(&key);
            inner.order.retain(|k| k != &key);
            inner.stats.misses += 1;
            inner.stats.evictions += 1;
            return None;
        }

        inner.order.retain(|k| k != &key);
        inner.order.push(key.clone());
        let entry = inner.entries.get_mut(&key).expect("checked above");
        entry.hits += 1;
        inner.stats.hits += 1;
        Some(entry.response.clone())
    }

    pub async fn put(&self, model: &str, messages: &[Message], response: String) {
        if !self.enabled {
            return;
        }
        let key = Self::key_for(model, messages);
        let mut inner = self.inner.lock().await;

        while inner.order.len() >= self.max_size && !inner.order.is_empty() {
            let oldest = inner.order.remove(0);
            inner.entries.remove(&oldest);
            inner.stats.evictions += 1;
        }

        inner.entries.insert(
            key.clone(),
            CacheEntry { response, created_at: Instant::now(), hits: 0 },
        );
        inner.order.retain(|k| k != &key);
        inner.order.push(key);
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.entries.clear();
        inner.order.clear();
        inner.stats = CacheStats::default();
    }

    pub async fn stats(&self) -> CacheStats {
        self.inner.lock().await.stats.clone()
    }

    pub async fn size(&self) -> usize {
        self.inner.lock().await.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Message;

    fn msgs() -> Vec<Message> {
        vec![Message::user("hello")]
    }

    #[tokio::test]
    async fn miss_then_hit() {
        let cache = ResponseCache::new(true, 10, 3600.0);
        assert!(cache.get("m1", &msgs()).await.is_none());
        cache.put("m1", &msgs(), "result".to_string()).await;
        assert_eq!(cache.get("m1", &msgs()).await, Some("result".to_string()));
        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn disabled_cache_never_stores() {
        let cache = ResponseCache::new(false, 10, 3600.0);
        cache.put("m1", &msgs(), "result".to_string()).await;
        assert!(cache.get("m1", &msgs()).await.is_none());
        assert_eq!(cache.size().await, 0);
    }

    #[tokio::test]
    async fn evicts_oldest_when_full() {
        let cache = ResponseCache::new(true, 1, 3600.0);
        cache.put("m1", &[Message::user("a")], "a".to_string()).await;
        cache.put("m1", &[Message::user("b")], "b".to_string()).await;
        assert_eq!(cache.size().await, 1);
        assert!(cache.get("m1", &[Message::user("a")]).await.is_none());
        assert_eq!(cache.get("m1", &[Message::user("b")]).await, Some("b".to_string()));
    }

    #[tokio::test]
    async fn ttl_expiry_evicts_entry() {
        let cache = ResponseCache::new(true, 10, 0.01);
        cache.put("m1", &msgs(), "result".to_string()).await;
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        assert!(cache.get("m1", &msgs()).await.is_none());
    }
}
