//! SHELF API - REST/WebSocket API Layer
//!
//! Exposes the product catalog over HTTP (Axum) and streams change events
//! to WebSocket sessions.
//!
//! Reads are served from a snapshot cache in front of the record store.
//! Writes persist, invalidate the snapshot, and announce the change on the
//! notification bus; the fan-out gateway relays it to every live session.

pub mod bootstrap;
pub mod catalog;
pub mod config;
pub mod error;
pub mod gateway;
pub mod macros;
pub mod openapi;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod types;
pub mod ws;

// Re-export commonly used types
pub use bootstrap::{build_backends, build_state, Backends};
pub use catalog::{CatalogService, Listing, ReadSource, WriteOutcome};
pub use config::{BusKind, CacheKind, ServiceConfig, StoreKind};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use gateway::{FanoutGateway, RelayedMessage, SessionHandle, SessionId};
pub use openapi::ApiDoc;
pub use routes::create_router;
pub use state::AppState;
pub use types::*;
