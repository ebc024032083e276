//! Record store: the authoritative storage for products.

pub mod memory;
pub mod postgres;
pub mod traits;

pub use memory::InMemoryRecordStore;
pub use postgres::{DbConfig, PgRecordStore};
pub use traits::RecordStore;
