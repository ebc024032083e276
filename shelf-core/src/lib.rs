//! SHELF Core - Entity Types
//!
//! Pure data structures shared by every other crate: the product entity,
//! change events, well-known cache keys and topics, and the error taxonomy.
//! This crate contains no I/O.

pub mod constants;
pub mod entities;
pub mod error;

pub use constants::*;
pub use entities::{ChangeEvent, ChangeKind, NewProduct, Product, ProductId};
pub use error::{
    BusError, BusResult, CacheError, CacheResult, ConfigError, ShelfError, ShelfResult,
    StorageError, StorageResult, ValidationError,
};
