//! REST API Route Handlers
//!
//! This module assembles the HTTP surface of the service:
//! - `/products`, `/product`: catalog reads and writes
//! - `/publish`: custom channel messages
//! - `/ws`: real-time change feed
//! - `/health/*`: probes
//! - `/openapi.json`: generated API document

pub mod health;
pub mod products;
pub mod publish;

use axum::{
    http::{header, HeaderValue, Method},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;

use crate::config::ServiceConfig;
use crate::openapi::ApiDoc;
use crate::state::AppState;
use crate::ws::ws_handler;

/// Handler for /openapi.json endpoint.
async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

/// Build the complete application router.
pub fn create_router(state: AppState, config: &ServiceConfig) -> Router {
    Router::new()
        .route("/products", get(products::list_products))
        .route("/product", post(products::create_product))
        .route("/publish", post(publish::publish_message))
        .route("/ws", get(ws_handler))
        .nest("/health", health::create_router())
        .route("/openapi.json", get(openapi_json))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(config))
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(config: &ServiceConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    if config.cors_origins.is_empty() {
        // Development mode: allow all origins
        tracing::info!("CORS: Development mode - allowing all origins");
        cors.allow_origin(Any)
    } else {
        tracing::info!(
            "CORS: Production mode - allowing origins: {:?}",
            config.cors_origins
        );
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}
