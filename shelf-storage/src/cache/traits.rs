//! Cache backend trait and usage statistics.

use std::time::Duration;

use async_trait::async_trait;
use shelf_core::CacheResult;

/// Cache backend trait for pluggable cache implementations.
///
/// Implementations must be thread-safe; the orchestrator shares one backend
/// across every in-flight request.
///
/// # Contract
///
/// - `get` after `set` with an unexpired ttl returns exactly the value set.
/// - Once `ttl` has elapsed the entry is absent, with no intervening write.
/// - `delete` of an absent key succeeds.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get a value, or `None` when the key was never set, has expired or was deleted.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Store a value that expires `ttl` after this call.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    /// Remove a value. Idempotent.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Get cache statistics.
    async fn stats(&self) -> CacheResult<CacheStats>;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses, expired entries included.
    pub misses: u64,
    /// Number of entries currently stored, expired-but-unreaped included.
    pub entry_count: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
