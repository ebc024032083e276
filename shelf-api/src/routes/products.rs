//! Product REST API Routes
//!
//! Read and write endpoints for the catalog. Both delegate to the
//! [`CatalogService`], which owns the cache and change-event protocol.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use shelf_core::{NewProduct, Product};
use std::sync::Arc;

use crate::{
    catalog::CatalogService,
    error::{ApiError, ApiResult},
    types::{CreateProductRequest, CreateProductResponse},
};

/// GET /products - List every product
#[utoipa::path(
    get,
    path = "/products",
    tag = "Products",
    responses(
        (status = 200, description = "All products, ordered by id", body = [Product]),
        (status = 500, description = "Record store failure", body = ApiError),
    ),
)]
pub async fn list_products(
    State(catalog): State<Arc<CatalogService>>,
) -> ApiResult<Json<Vec<Product>>> {
    let listing = catalog.list_products().await?;
    Ok(Json(listing.products))
}

/// POST /product - Create a new product
#[utoipa::path(
    post,
    path = "/product",
    tag = "Products",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product created successfully", body = CreateProductResponse),
        (status = 400, description = "Missing or blank name", body = ApiError),
        (status = 500, description = "Record store failure", body = ApiError),
    ),
)]
pub async fn create_product(
    State(catalog): State<Arc<CatalogService>>,
    body: Result<Json<CreateProductRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = body?;

    // Validate before any side effect
    let product = NewProduct::try_from(req)?;

    let outcome = catalog.create_product(product).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateProductResponse::created(outcome.product.id)),
    ))
}
