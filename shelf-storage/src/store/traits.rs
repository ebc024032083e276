//! Record store trait.

use async_trait::async_trait;
use shelf_core::{NewProduct, Product, ProductId, StorageResult};

/// Storage trait for products.
///
/// Implementations own product lifetime: ids are assigned here, are strictly
/// increasing and are never reused.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist a new product and return the id assigned to it.
    ///
    /// Fails with `StorageError::InsertFailed` when the product has no name.
    async fn insert(&self, product: &NewProduct) -> StorageResult<ProductId>;

    /// Read every product, ordered by ascending id.
    async fn scan_all(&self) -> StorageResult<Vec<Product>>;

    /// Check that the store is reachable.
    async fn ping(&self) -> StorageResult<()>;
}
