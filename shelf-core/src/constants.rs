//! Well-known names shared between the orchestrator, the cache and the bus.

use std::time::Duration;

/// Cache key holding the snapshot of every product.
///
/// There is exactly one key for the whole collection; writes invalidate it
/// wholesale.
pub const ALL_PRODUCTS_CACHE_KEY: &str = "products:all";

/// Bus topic reserved for product change events.
pub const PRODUCT_CHANGES_TOPIC: &str = "product_changes";

/// Event name sessions see for messages relayed from [`PRODUCT_CHANGES_TOPIC`].
pub const ENTITY_CHANGED_EVENT: &str = "entity_changed";

/// Lifetime of the all-products snapshot.
pub const SNAPSHOT_TTL: Duration = Duration::from_secs(3600);

/// Longest topic name accepted by the bus transports (PostgreSQL identifier limit).
pub const MAX_TOPIC_LEN: usize = 63;
