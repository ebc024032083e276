//! In-process cache backend.
//!
//! Expiry is measured with [`tokio::time::Instant`], so tests can drive it
//! with paused time instead of sleeping.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use shelf_core::CacheResult;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::traits::{CacheBackend, CacheStats};

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Cache backed by a `HashMap` behind an async `RwLock`.
///
/// Expired entries are reaped lazily by the `get` that observes them.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl InMemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if !entry.is_expired(now) => {
                    self.record_hit();
                    return Ok(Some(entry.value.clone()));
                }
                Some(_) => {}
                None => {
                    self.record_miss();
                    return Ok(None);
                }
            }
        }

        // Expired: reap it unless a concurrent set already replaced it.
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
        }
        self.record_miss();
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let entry = CacheEntry {
            value: value.to_string(),
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn stats(&self) -> CacheResult<CacheStats> {
        let entry_count = self.entries.read().await.len() as u64;
        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn test_get_after_set_returns_value() {
        let cache = InMemoryCache::new();
        cache
            .set("products:all", "[1,2,3]", TTL)
            .await
            .expect("set should succeed");

        let value = cache.get("products:all").await.expect("get should succeed");
        assert_eq!(value.as_deref(), Some("[1,2,3]"));
    }

    #[tokio::test]
    async fn test_set_overwrites_previous_value() {
        let cache = InMemoryCache::new();
        cache.set("k", "first", TTL).await.expect("set should succeed");
        cache.set("k", "second", TTL).await.expect("set should succeed");

        let value = cache.get("k").await.expect("get should succeed");
        assert_eq!(value.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_get_never_set_is_absent() {
        let cache = InMemoryCache::new();
        let value = cache.get("missing").await.expect("get should succeed");
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let cache = InMemoryCache::new();
        cache.delete("missing").await.expect("delete of absent key should succeed");

        cache.set("k", "v", TTL).await.expect("set should succeed");
        cache.delete("k").await.expect("delete should succeed");
        cache.delete("k").await.expect("second delete should succeed");

        assert!(cache.get("k").await.expect("get should succeed").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache = InMemoryCache::new();
        cache
            .set("k", "v", Duration::from_secs(10))
            .await
            .expect("set should succeed");

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(cache.get("k").await.expect("get should succeed").is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("k").await.expect("get should succeed").is_none());

        let stats = cache.stats().await.expect("stats should succeed");
        assert_eq!(stats.entry_count, 0, "expired entry should be reaped");
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_ttl_expiry() {
        let cache = InMemoryCache::new();
        cache
            .set("products:all", "[]", shelf_core::SNAPSHOT_TTL)
            .await
            .expect("set should succeed");

        tokio::time::advance(shelf_core::SNAPSHOT_TTL + Duration::from_millis(1)).await;
        assert!(cache
            .get("products:all")
            .await
            .expect("get should succeed")
            .is_none());
    }

    #[tokio::test]
    async fn test_stats_track_hits_and_misses() {
        let cache = InMemoryCache::new();
        cache.set("k", "v", TTL).await.expect("set should succeed");

        cache.get("k").await.expect("get should succeed");
        cache.get("k").await.expect("get should succeed");
        cache.get("other").await.expect("get should succeed");

        let stats = cache.stats().await.expect("stats should succeed");
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entry_count, 1);
    }
}
