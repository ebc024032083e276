//! SHELF Test Utilities
//!
//! Centralized test infrastructure for the SHELF workspace:
//! - Proptest generators for products
//! - Fixtures for common scenarios
//! - Instrumented fakes that count collaborator calls
//! - Failing and hanging fakes for error-path tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use proptest::prelude::*;

// Re-export core types for convenience
pub use shelf_bus::{BusMessage, InMemoryBus, MessageHandler, NotificationBus, Subscription};
pub use shelf_core::{
    BusError, BusResult, CacheError, CacheResult, ChangeEvent, ChangeKind, NewProduct, Product,
    ProductId, StorageError, StorageResult, ALL_PRODUCTS_CACHE_KEY, PRODUCT_CHANGES_TOPIC,
};
pub use shelf_storage::{CacheBackend, CacheStats, InMemoryCache, InMemoryRecordStore, RecordStore};

// ============================================================================
// FIXTURES
// ============================================================================

/// A product without a description.
pub fn new_product(name: &str) -> NewProduct {
    NewProduct {
        name: name.to_string(),
        description: None,
    }
}

/// The product used by the end-to-end scenarios.
pub fn laptop_pro() -> NewProduct {
    NewProduct {
        name: "Laptop Pro".to_string(),
        description: Some("15-inch, 32GB".to_string()),
    }
}

/// A persisted product.
pub fn product(id: ProductId, name: &str) -> Product {
    new_product(name).with_id(id)
}

// ============================================================================
// GENERATORS
// ============================================================================

/// Names that survive trimming.
pub fn arb_product_name() -> impl Strategy<Value = String> {
    "[A-Za-z0-9][A-Za-z0-9 ._-]{0,31}"
}

/// Names that are empty after trimming.
pub fn arb_blank_name() -> impl Strategy<Value = String> {
    "[ \t\n]{0,8}"
}

pub fn arb_description() -> impl Strategy<Value = Option<String>> {
    prop::option::of("[ -~]{0,64}")
}

pub fn arb_new_product() -> impl Strategy<Value = NewProduct> {
    (arb_product_name(), arb_description())
        .prop_map(|(name, description)| NewProduct { name, description })
}

// ============================================================================
// COUNTING FAKES
// ============================================================================

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::SeqCst);
}

/// In-memory record store that counts calls.
#[derive(Debug, Default)]
pub struct CountingStore {
    inner: InMemoryRecordStore,
    inserts: AtomicUsize,
    scans: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert attempts, including rejected ones.
    pub fn inserts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn scans(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for CountingStore {
    async fn insert(&self, product: &NewProduct) -> StorageResult<ProductId> {
        bump(&self.inserts);
        self.inner.insert(product).await
    }

    async fn scan_all(&self) -> StorageResult<Vec<Product>> {
        bump(&self.scans);
        self.inner.scan_all().await
    }

    async fn ping(&self) -> StorageResult<()> {
        self.inner.ping().await
    }
}

/// In-memory cache that counts calls.
#[derive(Debug, Default)]
pub struct CountingCache {
    inner: InMemoryCache,
    gets: AtomicUsize,
    sets: AtomicUsize,
    deletes: AtomicUsize,
}

impl CountingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheBackend for CountingCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        bump(&self.gets);
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        bump(&self.sets);
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        bump(&self.deletes);
        self.inner.delete(key).await
    }

    async fn stats(&self) -> CacheResult<CacheStats> {
        self.inner.stats().await
    }
}

/// In-memory bus that records every publish.
#[derive(Default)]
pub struct CountingBus {
    inner: InMemoryBus,
    published: Mutex<Vec<BusMessage>>,
}

impl CountingBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publishes(&self) -> usize {
        self.published().len()
    }

    /// Every message handed to `publish`, in call order.
    pub fn published(&self) -> Vec<BusMessage> {
        self.published
            .lock()
            .map(|published| published.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl NotificationBus for CountingBus {
    async fn publish(&self, topic: &str, payload: &str) -> BusResult<()> {
        if let Ok(mut published) = self.published.lock() {
            published.push(BusMessage::new(topic, payload));
        }
        self.inner.publish(topic, payload).await
    }

    async fn subscribe(&self, topic: &str, handler: MessageHandler) -> BusResult<Subscription> {
        self.inner.subscribe(topic, handler).await
    }

    async fn unsubscribe(&self, subscription: &Subscription) -> BusResult<()> {
        self.inner.unsubscribe(subscription).await
    }

    async fn close(&self) -> BusResult<()> {
        self.inner.close().await
    }
}

// ============================================================================
// FAILING FAKES
// ============================================================================

/// Record store whose every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingStore;

#[async_trait]
impl RecordStore for FailingStore {
    async fn insert(&self, _product: &NewProduct) -> StorageResult<ProductId> {
        Err(StorageError::Unavailable {
            reason: "store offline".to_string(),
        })
    }

    async fn scan_all(&self) -> StorageResult<Vec<Product>> {
        Err(StorageError::Unavailable {
            reason: "store offline".to_string(),
        })
    }

    async fn ping(&self) -> StorageResult<()> {
        Err(StorageError::Unavailable {
            reason: "store offline".to_string(),
        })
    }
}

/// Cache whose every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingCache;

#[async_trait]
impl CacheBackend for FailingCache {
    async fn get(&self, _key: &str) -> CacheResult<Option<String>> {
        Err(CacheError::Unavailable {
            reason: "cache offline".to_string(),
        })
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> CacheResult<()> {
        Err(CacheError::Unavailable {
            reason: "cache offline".to_string(),
        })
    }

    async fn delete(&self, _key: &str) -> CacheResult<()> {
        Err(CacheError::Unavailable {
            reason: "cache offline".to_string(),
        })
    }

    async fn stats(&self) -> CacheResult<CacheStats> {
        Err(CacheError::Unavailable {
            reason: "cache offline".to_string(),
        })
    }
}

/// Bus whose every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingBus;

#[async_trait]
impl NotificationBus for FailingBus {
    async fn publish(&self, topic: &str, _payload: &str) -> BusResult<()> {
        Err(BusError::PublishFailed {
            topic: topic.to_string(),
            reason: "bus offline".to_string(),
        })
    }

    async fn subscribe(&self, topic: &str, _handler: MessageHandler) -> BusResult<Subscription> {
        Err(BusError::SubscribeFailed {
            topic: topic.to_string(),
            reason: "bus offline".to_string(),
        })
    }

    async fn unsubscribe(&self, _subscription: &Subscription) -> BusResult<()> {
        Ok(())
    }

    async fn close(&self) -> BusResult<()> {
        Ok(())
    }
}

// ============================================================================
// HANGING FAKES
// ============================================================================

/// Record store whose calls never complete. Used for timeout tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct HangingStore;

#[async_trait]
impl RecordStore for HangingStore {
    async fn insert(&self, _product: &NewProduct) -> StorageResult<ProductId> {
        std::future::pending().await
    }

    async fn scan_all(&self) -> StorageResult<Vec<Product>> {
        std::future::pending().await
    }

    async fn ping(&self) -> StorageResult<()> {
        std::future::pending().await
    }
}

/// Cache whose calls never complete. Used for timeout tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct HangingCache;

#[async_trait]
impl CacheBackend for HangingCache {
    async fn get(&self, _key: &str) -> CacheResult<Option<String>> {
        std::future::pending().await
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> CacheResult<()> {
        std::future::pending().await
    }

    async fn delete(&self, _key: &str) -> CacheResult<()> {
        std::future::pending().await
    }

    async fn stats(&self) -> CacheResult<CacheStats> {
        std::future::pending().await
    }
}
