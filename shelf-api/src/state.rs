//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use crate::catalog::CatalogService;
use crate::gateway::FanoutGateway;

/// Application-wide state shared across all routes.
///
/// Collaborators are built and connected before the router exists, then
/// injected here.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<CatalogService>,
    pub gateway: Arc<FanoutGateway>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(catalog: Arc<CatalogService>, gateway: Arc<FanoutGateway>) -> Self {
        Self {
            catalog,
            gateway,
            start_time: Instant::now(),
        }
    }
}

crate::impl_from_ref!(Arc<CatalogService>, catalog);
crate::impl_from_ref!(Arc<FanoutGateway>, gateway);
crate::impl_from_ref!(Instant, start_time);
