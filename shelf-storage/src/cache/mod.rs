//! Cache layer with per-entry time-to-live.
//!
//! The cache never holds authoritative data. A value is either present and
//! unexpired, or absent; callers cannot tell "never set", "expired" and
//! "deleted" apart, and they do not need to.
//!
//! # Example
//!
//! ```ignore
//! let cache = InMemoryCache::new();
//! cache.set("products:all", &snapshot, Duration::from_secs(3600)).await?;
//! assert_eq!(cache.get("products:all").await?, Some(snapshot));
//! cache.delete("products:all").await?;
//! ```

pub mod lmdb_backend;
pub mod memory;
pub mod traits;

pub use lmdb_backend::{LmdbCache, LmdbCacheError};
pub use memory::InMemoryCache;
pub use traits::{CacheBackend, CacheStats};
