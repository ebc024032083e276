//! Request and response bodies for the REST endpoints.

use serde::{Deserialize, Serialize};
use shelf_core::{NewProduct, ProductId, ValidationError};
use utoipa::ToSchema;

/// Body of `POST /product`.
///
/// Fields are optional at the wire level so a missing name is reported as a
/// validation error rather than a deserialization failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CreateProductRequest {
    #[schema(example = "Laptop Pro")]
    pub name: Option<String>,
    #[schema(example = "15-inch, 32GB")]
    pub description: Option<String>,
}

impl TryFrom<CreateProductRequest> for NewProduct {
    type Error = ValidationError;

    fn try_from(req: CreateProductRequest) -> Result<Self, Self::Error> {
        let name = req.name.ok_or_else(|| ValidationError::RequiredFieldMissing {
            field: "name".to_string(),
        })?;
        NewProduct::new(name, req.description)
    }
}

/// Body returned by `POST /product`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CreateProductResponse {
    pub message: String,
    #[serde(rename = "productId")]
    pub product_id: ProductId,
}

impl CreateProductResponse {
    pub fn created(product_id: ProductId) -> Self {
        Self {
            message: "Product created".to_string(),
            product_id,
        }
    }
}

/// Body of `POST /publish`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PublishRequest {
    #[schema(example = "alerts")]
    pub channel: Option<String>,
    #[schema(example = "disk full")]
    pub message: Option<String>,
}

/// Body returned by `POST /publish`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PublishResponse {
    pub message: String,
}
