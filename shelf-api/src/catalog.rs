//! Catalog Service - Read/Write Orchestrator
//!
//! Coordinates the record store, the snapshot cache and the notification
//! bus for every catalog operation.
//!
//! ## Read path
//!
//! ```text
//! CHECKING_CACHE --hit--> SERVING_CACHED
//!       |
//!      miss --> LOADING_STORE --> POPULATING_CACHE --> SERVING_FRESH
//! ```
//!
//! A cache that errors or holds an undecodable snapshot counts as a miss.
//! A failed cache write is logged and the fresh result is still served.
//!
//! ## Write path
//!
//! ```text
//! VALIDATING --> PERSISTING --> INVALIDATING --> PUBLISHING --> DONE
//! ```
//!
//! Only validation and persistence can fail the write. Invalidation and
//! publication are best effort once the product is stored; their failures
//! are logged and reported in the [`WriteOutcome`].
//!
//! Every collaborator call is bounded by the configured call timeout. A
//! timeout is reported as that collaborator being unavailable.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use shelf_bus::NotificationBus;
use shelf_core::{
    BusError, CacheError, CacheResult, ChangeEvent, NewProduct, Product, ShelfResult,
    StorageError, StorageResult, ValidationError, ALL_PRODUCTS_CACHE_KEY, PRODUCT_CHANGES_TOPIC,
    SNAPSHOT_TTL,
};
use shelf_storage::{CacheBackend, CacheStats, RecordStore};
use tracing::{debug, info, warn};

/// Where a product listing was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    Cache,
    Store,
}

/// Result of [`CatalogService::list_products`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub products: Vec<Product>,
    pub source: ReadSource,
}

/// Result of a successful [`CatalogService::create_product`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    /// The product as persisted, id included.
    pub product: Product,
    /// Whether the snapshot was dropped from the cache.
    pub invalidated: bool,
    /// Whether the change event reached the bus.
    pub published: bool,
}

/// Orchestrates reads and writes across store, cache and bus.
pub struct CatalogService {
    store: Arc<dyn RecordStore>,
    cache: Arc<dyn CacheBackend>,
    bus: Arc<dyn NotificationBus>,
    call_timeout: Duration,
}

impl CatalogService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        cache: Arc<dyn CacheBackend>,
        bus: Arc<dyn NotificationBus>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            bus,
            call_timeout,
        }
    }

    pub fn bus(&self) -> &Arc<dyn NotificationBus> {
        &self.bus
    }

    // ========================================================================
    // READ PATH
    // ========================================================================

    /// List every product, from the cache when a snapshot is present.
    pub async fn list_products(&self) -> ShelfResult<Listing> {
        debug!(key = ALL_PRODUCTS_CACHE_KEY, "CHECKING_CACHE");
        if let Some(products) = self.cached_snapshot().await {
            debug!(count = products.len(), "SERVING_CACHED");
            return Ok(Listing {
                products,
                source: ReadSource::Cache,
            });
        }

        debug!("LOADING_STORE");
        let products = self.scan_store().await?;

        debug!(count = products.len(), "POPULATING_CACHE");
        if let Err(e) = self.populate_cache(&products).await {
            warn!(error = %e, "Failed to populate product cache, serving fresh result");
        }

        debug!(count = products.len(), "SERVING_FRESH");
        Ok(Listing {
            products,
            source: ReadSource::Store,
        })
    }

    async fn cached_snapshot(&self) -> Option<Vec<Product>> {
        let cached = self
            .within(self.cache.get(ALL_PRODUCTS_CACHE_KEY), || CacheError::Unavailable {
                reason: "cache get timed out".to_string(),
            })
            .await;

        match cached {
            Ok(Some(snapshot)) => match serde_json::from_str::<Vec<Product>>(&snapshot) {
                Ok(products) => Some(products),
                Err(e) => {
                    warn!(error = %e, "Cached product snapshot is undecodable, treating as miss");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    async fn scan_store(&self) -> StorageResult<Vec<Product>> {
        self.within(self.store.scan_all(), || StorageError::Unavailable {
            reason: "store scan timed out".to_string(),
        })
        .await
    }

    async fn populate_cache(&self, products: &[Product]) -> CacheResult<()> {
        let snapshot = serde_json::to_string(products).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;
        self.within(
            self.cache.set(ALL_PRODUCTS_CACHE_KEY, &snapshot, SNAPSHOT_TTL),
            || CacheError::Unavailable {
                reason: "cache set timed out".to_string(),
            },
        )
        .await
    }

    // ========================================================================
    // WRITE PATH
    // ========================================================================

    /// Persist a product, then invalidate the snapshot and announce the change.
    pub async fn create_product(&self, product: NewProduct) -> ShelfResult<WriteOutcome> {
        debug!("VALIDATING");
        product.validate()?;

        debug!(name = %product.name, "PERSISTING");
        let id = self
            .within(self.store.insert(&product), || StorageError::Unavailable {
                reason: "store insert timed out".to_string(),
            })
            .await?;
        let product = product.with_id(id);

        debug!(product_id = id, "INVALIDATING");
        let invalidated = match self
            .within(self.cache.delete(ALL_PRODUCTS_CACHE_KEY), || {
                CacheError::Unavailable {
                    reason: "cache delete timed out".to_string(),
                }
            })
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(product_id = id, error = %e, "Failed to invalidate product cache");
                false
            }
        };

        debug!(product_id = id, topic = PRODUCT_CHANGES_TOPIC, "PUBLISHING");
        let published = match self.announce(&product).await {
            Ok(()) => true,
            Err(e) => {
                warn!(product_id = id, error = %e, "Failed to publish change event");
                false
            }
        };

        info!(product_id = id, invalidated, published, "Product created");
        Ok(WriteOutcome {
            product,
            invalidated,
            published,
        })
    }

    async fn announce(&self, product: &Product) -> Result<(), BusError> {
        let event = ChangeEvent::new_entity(product.clone());
        let payload = serde_json::to_string(&event).map_err(|e| BusError::PublishFailed {
            topic: PRODUCT_CHANGES_TOPIC.to_string(),
            reason: e.to_string(),
        })?;
        self.publish(PRODUCT_CHANGES_TOPIC, &payload).await
    }

    // ========================================================================
    // CUSTOM PUBLISH
    // ========================================================================

    /// Publish an arbitrary message on a custom channel.
    ///
    /// The channel name is trimmed, the same way socket subscriptions trim
    /// it. Unlike the write path, a bus failure here fails the call.
    pub async fn publish_custom(&self, channel: &str, message: &str) -> ShelfResult<()> {
        let channel = channel.trim();
        if channel.is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "channel".to_string(),
            }
            .into());
        }
        if message.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "message".to_string(),
            }
            .into());
        }

        self.publish(channel, message).await?;
        debug!(channel, "Published custom message");
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &str) -> Result<(), BusError> {
        self.within(self.bus.publish(topic, payload), || BusError::Unavailable {
            reason: format!("publish to {} timed out", topic),
        })
        .await
    }

    // ========================================================================
    // HEALTH
    // ========================================================================

    /// Check that the record store answers.
    pub async fn check_store(&self) -> StorageResult<()> {
        self.within(self.store.ping(), || StorageError::Unavailable {
            reason: "store ping timed out".to_string(),
        })
        .await
    }

    pub async fn cache_stats(&self) -> CacheResult<CacheStats> {
        self.within(self.cache.stats(), || CacheError::Unavailable {
            reason: "cache stats timed out".to_string(),
        })
        .await
    }

    async fn within<T, E, F>(&self, call: F, on_timeout: impl FnOnce() -> E) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(on_timeout()),
        }
    }
}
