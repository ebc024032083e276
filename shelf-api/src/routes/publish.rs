//! Custom publish endpoint.

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use std::sync::Arc;

use crate::{
    catalog::CatalogService,
    error::{ApiError, ApiResult},
    types::{PublishRequest, PublishResponse},
};

/// POST /publish - Publish a message on a custom channel
///
/// Delivery is best effort: with no subscriber on the channel the message is
/// lost and the call still succeeds.
#[utoipa::path(
    post,
    path = "/publish",
    tag = "Messaging",
    request_body = PublishRequest,
    responses(
        (status = 200, description = "Message handed to the bus", body = PublishResponse),
        (status = 400, description = "Missing channel or message", body = ApiError),
        (status = 500, description = "Notification bus failure", body = ApiError),
    ),
)]
pub async fn publish_message(
    State(catalog): State<Arc<CatalogService>>,
    body: Result<Json<PublishRequest>, JsonRejection>,
) -> ApiResult<Json<PublishResponse>> {
    let Json(req) = body?;

    let channel = req
        .channel
        .ok_or_else(|| ApiError::missing_field("channel"))?;
    let message = req
        .message
        .ok_or_else(|| ApiError::missing_field("message"))?;

    catalog.publish_custom(&channel, &message).await?;

    Ok(Json(PublishResponse {
        message: format!("Message published to {}", channel),
    }))
}
