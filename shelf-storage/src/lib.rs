//! SHELF Storage - Record Store and Cache Layer
//!
//! Defines the two storage abstractions the catalog orchestrator coordinates:
//!
//! - [`RecordStore`]: the authoritative, durable home of products.
//! - [`CacheBackend`]: a key-value store with per-entry expiry holding a
//!   disposable snapshot derived from the record store.
//!
//! Each abstraction ships an in-memory implementation (tests, single-node
//! demos) and a durable one (PostgreSQL for records, LMDB for the cache).

pub mod cache;
pub mod store;

pub use cache::{CacheBackend, CacheStats, InMemoryCache, LmdbCache, LmdbCacheError};
pub use store::{DbConfig, InMemoryRecordStore, PgRecordStore, RecordStore};
