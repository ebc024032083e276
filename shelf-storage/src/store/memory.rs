//! In-process record store.

use async_trait::async_trait;
use shelf_core::{NewProduct, Product, ProductId, StorageError, StorageResult};
use tokio::sync::RwLock;

use super::traits::RecordStore;

#[derive(Debug, Default)]
struct Records {
    last_id: ProductId,
    products: Vec<Product>,
}

/// Record store keeping products in memory for the lifetime of the process.
///
/// Products are appended in id order, so `scan_all` is ordered without sorting.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: RwLock<Records>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of products stored.
    pub async fn len(&self) -> usize {
        self.records.read().await.products.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn insert(&self, product: &NewProduct) -> StorageResult<ProductId> {
        product
            .validate()
            .map_err(|e| StorageError::InsertFailed {
                reason: e.to_string(),
            })?;

        let mut records = self.records.write().await;
        records.last_id += 1;
        let id = records.last_id;
        records.products.push(product.clone().with_id(id));
        Ok(id)
    }

    async fn scan_all(&self) -> StorageResult<Vec<Product>> {
        Ok(self.records.read().await.products.clone())
    }

    async fn ping(&self) -> StorageResult<()> {
        Ok(())
    }
}
