//! OpenAPI Specification Generation
//!
//! Generates the OpenAPI 3.1 document for the SHELF REST API using utoipa.
//! The WebSocket endpoint is not described here; see [`crate::ws`].

use utoipa::OpenApi;

use crate::error::{ApiError, ErrorCode};
use crate::routes::health::{CacheHealth, ComponentHealth, HealthDetails, HealthResponse, HealthStatus};
use crate::types::{CreateProductRequest, CreateProductResponse, PublishRequest, PublishResponse};
use shelf_core::{ChangeEvent, ChangeKind, Product};

/// OpenAPI documentation for the SHELF API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "SHELF API",
        version = "0.1.0",
        description = "Cache-fronted product catalog with real-time change notifications",
        license(name = "MIT"),
    ),
    servers(
        (url = "/", description = "Current server")
    ),
    tags(
        (name = "Products", description = "Product listing and creation"),
        (name = "Messaging", description = "Custom channel publishing"),
        (name = "Health", description = "Liveness and readiness probes"),
    ),
    paths(
        crate::routes::products::list_products,
        crate::routes::products::create_product,
        crate::routes::publish::publish_message,
        crate::routes::health::ping,
        crate::routes::health::liveness,
        crate::routes::health::readiness,
    ),
    components(
        schemas(
            // Domain
            Product,
            ChangeEvent,
            ChangeKind,
            // Requests and responses
            CreateProductRequest,
            CreateProductResponse,
            PublishRequest,
            PublishResponse,
            // Health
            HealthResponse,
            HealthStatus,
            HealthDetails,
            ComponentHealth,
            CacheHealth,
            // Errors
            ApiError,
            ErrorCode,
        )
    )
)]
pub struct ApiDoc;

impl ApiDoc {
    /// Render the document as pretty-printed JSON.
    pub fn to_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::openapi())
    }
}
