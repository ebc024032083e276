//! HTTP-level tests for the catalog endpoints.
//!
//! Requests go through the full router with `tower::ServiceExt::oneshot`,
//! backed by in-memory or instrumented collaborators.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{Method, StatusCode};
use shelf_api::gateway::SessionHandle;
use shelf_api::RelayedMessage;
use shelf_core::{ENTITY_CHANGED_EVENT, PRODUCT_CHANGES_TOPIC};
use shelf_test_utils::*;

#[allow(dead_code)]
#[path = "support/app.rs"]
mod test_app_support;

use test_app_support::{send, started_state, test_router, test_state};

async fn next_message(session: &mut SessionHandle) -> RelayedMessage {
    tokio::time::timeout(Duration::from_secs(1), session.recv())
        .await
        .expect("message should be relayed in time")
        .expect("fan-out list should be open")
}

async fn in_memory_state() -> shelf_api::AppState {
    started_state(
        Arc::new(InMemoryRecordStore::new()),
        Arc::new(InMemoryCache::new()),
        Arc::new(InMemoryBus::new()),
    )
    .await
}

// ============================================================================
// SCENARIOS
// ============================================================================

#[tokio::test]
async fn scenario_laptop_pro_is_created_announced_and_listed() {
    let state = in_memory_state().await;
    let router = test_router(state.clone());
    let mut first = state.gateway.connect();
    let mut second = state.gateway.connect();

    let (status, body) = send(
        &router,
        Method::POST,
        "/product",
        Some(r#"{"name":"Laptop Pro","description":"15-inch, 32GB"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Product created");
    assert_eq!(body["productId"], 1);

    for session in [&mut first, &mut second] {
        let message = next_message(session).await;
        assert_eq!(message.event, ENTITY_CHANGED_EVENT);
        assert_eq!(message.payload["kind"], "NEW_ENTITY");
        assert_eq!(message.payload["entity"]["id"], 1);
        assert_eq!(message.payload["entity"]["name"], "Laptop Pro");
    }

    let (status, body) = send(&router, Method::GET, "/products", None).await;
    assert_eq!(status, StatusCode::OK);
    let products = body.as_array().expect("listing should be an array");
    assert_eq!(products.len(), 1);
    assert_eq!(products[0]["id"], 1);
    assert_eq!(products[0]["name"], "Laptop Pro");
    assert_eq!(products[0]["description"], "15-inch, 32GB");
}

#[tokio::test]
async fn scenario_publish_without_sessions_is_accepted() {
    let bus = Arc::new(CountingBus::new());
    let state = started_state(
        Arc::new(InMemoryRecordStore::new()),
        Arc::new(InMemoryCache::new()),
        bus.clone(),
    )
    .await;
    let router = test_router(state.clone());
    assert_eq!(state.gateway.session_count(), 0);

    let (status, body) = send(
        &router,
        Method::POST,
        "/publish",
        Some(r#"{"channel":"alerts","message":"disk full"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Message published to alerts");

    let published = bus.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].topic, "alerts");
    assert_eq!(published[0].payload, "disk full");
}

// ============================================================================
// READ PATH
// ============================================================================

#[tokio::test]
async fn test_empty_catalog_lists_empty_array() {
    let router = test_router(in_memory_state().await);
    let (status, body) = send(&router, Method::GET, "/products", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!([]));
}

#[tokio::test]
async fn test_repeated_reads_hit_the_store_once() {
    let store = Arc::new(CountingStore::new());
    let cache = Arc::new(CountingCache::new());
    let state = started_state(store.clone(), cache.clone(), Arc::new(InMemoryBus::new())).await;
    let router = test_router(state);

    for _ in 0..3 {
        let (status, _) = send(&router, Method::GET, "/products", None).await;
        assert_eq!(status, StatusCode::OK);
    }
    assert_eq!(store.scans(), 1);
    assert_eq!(cache.gets(), 3);
    assert_eq!(cache.sets(), 1);
}

#[tokio::test]
async fn test_read_after_write_includes_new_product() {
    let router = test_router(in_memory_state().await);

    send(&router, Method::POST, "/product", Some(r#"{"name":"Desk"}"#)).await;
    // Warm the cache, then write again
    let (_, before) = send(&router, Method::GET, "/products", None).await;
    assert_eq!(before.as_array().map(Vec::len), Some(1));

    let (status, created) = send(&router, Method::POST, "/product", Some(r#"{"name":"Lamp"}"#)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["productId"], 2);

    let (_, after) = send(&router, Method::GET, "/products", None).await;
    let names: Vec<&str> = after
        .as_array()
        .expect("listing should be an array")
        .iter()
        .filter_map(|p| p["name"].as_str())
        .collect();
    assert_eq!(names, vec!["Desk", "Lamp"]);
}

#[tokio::test]
async fn test_failing_cache_still_serves_reads_and_writes() {
    let state = started_state(
        Arc::new(InMemoryRecordStore::new()),
        Arc::new(FailingCache),
        Arc::new(InMemoryBus::new()),
    )
    .await;
    let router = test_router(state);

    let (status, _) = send(&router, Method::POST, "/product", Some(r#"{"name":"Chair"}"#)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&router, Method::GET, "/products", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["name"], "Chair");
}

#[tokio::test]
async fn test_failing_store_returns_database_error() {
    let state = started_state(
        Arc::new(FailingStore),
        Arc::new(InMemoryCache::new()),
        Arc::new(InMemoryBus::new()),
    )
    .await;
    let router = test_router(state);

    let (status, body) = send(&router, Method::GET, "/products", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "DATABASE_ERROR");

    let (status, body) = send(&router, Method::POST, "/product", Some(r#"{"name":"Chair"}"#)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "DATABASE_ERROR");
}

#[tokio::test]
async fn test_failing_store_leaves_cache_and_bus_untouched() {
    let cache = Arc::new(CountingCache::new());
    let bus = Arc::new(CountingBus::new());
    let state = started_state(Arc::new(FailingStore), cache.clone(), bus.clone()).await;
    let router = test_router(state);

    let (status, _) = send(&router, Method::GET, "/products", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(cache.gets(), 1);
    assert_eq!(cache.sets(), 0);

    let (status, _) = send(&router, Method::POST, "/product", Some(r#"{"name":"Chair"}"#)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(cache.sets(), 0);
    assert_eq!(cache.deletes(), 0);
    assert_eq!(bus.publishes(), 0);
}

// ============================================================================
// WRITE PATH
// ============================================================================

#[tokio::test]
async fn test_missing_or_blank_name_has_no_side_effects() {
    let store = Arc::new(CountingStore::new());
    let cache = Arc::new(CountingCache::new());
    let bus = Arc::new(CountingBus::new());
    let state = started_state(store.clone(), cache.clone(), bus.clone()).await;
    let router = test_router(state);

    for body in [r#"{}"#, r#"{"name":"   "}"#, r#"{"description":"no name"}"#, "not json"] {
        let (status, response) = send(&router, Method::POST, "/product", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body {:?}", body);
        assert!(response["code"].is_string());
    }

    assert_eq!(store.inserts(), 0);
    assert_eq!(cache.deletes(), 0);
    assert_eq!(bus.publishes(), 0);
}

#[tokio::test]
async fn test_failing_bus_does_not_fail_the_write() {
    let state = test_state(
        Arc::new(InMemoryRecordStore::new()),
        Arc::new(InMemoryCache::new()),
        Arc::new(FailingBus),
    );
    let router = test_router(state);

    let (status, body) = send(&router, Method::POST, "/product", Some(r#"{"name":"Shelf"}"#)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["productId"], 1);

    let (status, body) = send(&router, Method::GET, "/products", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["name"], "Shelf");
}

#[tokio::test]
async fn test_write_publishes_change_on_reserved_topic() {
    let bus = Arc::new(CountingBus::new());
    let state = started_state(
        Arc::new(InMemoryRecordStore::new()),
        Arc::new(InMemoryCache::new()),
        bus.clone(),
    )
    .await;
    let router = test_router(state);

    send(&router, Method::POST, "/product", Some(r#"{"name":"Laptop Pro"}"#)).await;

    let published = bus.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].topic, PRODUCT_CHANGES_TOPIC);
    let event: ChangeEvent =
        serde_json::from_str(&published[0].payload).expect("payload should be a change event");
    assert_eq!(event.kind, ChangeKind::NewEntity);
    assert_eq!(event.entity.id, 1);
}

// ============================================================================
// CUSTOM PUBLISH
// ============================================================================

#[tokio::test]
async fn test_publish_requires_channel_and_message() {
    let bus = Arc::new(CountingBus::new());
    let state = test_state(
        Arc::new(InMemoryRecordStore::new()),
        Arc::new(InMemoryCache::new()),
        bus.clone(),
    );
    let router = test_router(state);

    for body in [
        r#"{"message":"hi"}"#,
        r#"{"channel":"alerts"}"#,
        r#"{"channel":"","message":"hi"}"#,
        r#"{"channel":"alerts","message":"  "}"#,
    ] {
        let (status, response) = send(&router, Method::POST, "/publish", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body {:?}", body);
        assert_eq!(response["code"], "MISSING_FIELD");
    }
    assert_eq!(bus.publishes(), 0);
}

#[tokio::test]
async fn test_publish_with_overlong_channel_is_rejected() {
    let router = test_router(in_memory_state().await);
    let body = format!(r#"{{"channel":"{}","message":"hi"}}"#, "c".repeat(64));
    let (status, response) = send(&router, Method::POST, "/publish", Some(body.as_str())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_publish_bus_failure_is_surfaced() {
    let state = test_state(
        Arc::new(InMemoryRecordStore::new()),
        Arc::new(InMemoryCache::new()),
        Arc::new(FailingBus),
    );
    let router = test_router(state);

    let (status, body) = send(
        &router,
        Method::POST,
        "/publish",
        Some(r#"{"channel":"alerts","message":"hi"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "MESSAGING_ERROR");
}

#[tokio::test]
async fn test_custom_topic_reaches_every_session_once_relayed() {
    let state = in_memory_state().await;
    let router = test_router(state.clone());
    let mut joined = state.gateway.connect();
    let mut bystander = state.gateway.connect();

    state
        .gateway
        .relay_topic("alerts")
        .await
        .expect("relay should register");
    joined.join("alerts");

    let (status, _) = send(
        &router,
        Method::POST,
        "/publish",
        Some(r#"{"channel":"alerts","message":"disk full"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    for session in [&mut joined, &mut bystander] {
        let message = next_message(session).await;
        assert_eq!(message.event, "alerts");
        assert_eq!(message.payload, "disk full");
    }
}

// ============================================================================
// HEALTH AND DOCS
// ============================================================================

#[tokio::test]
async fn test_health_endpoints() {
    let state = in_memory_state().await;
    let router = test_router(state.clone());
    let _session = state.gateway.connect();

    let (status, body) = send(&router, Method::GET, "/health/ping", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "pong");

    let (status, body) = send(&router, Method::GET, "/health/live", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = send(&router, Method::GET, "/health/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["details"]["store"]["status"], "healthy");
    assert_eq!(body["details"]["sessions"], 1);
}

#[tokio::test]
async fn test_readiness_reports_store_outage() {
    let state = started_state(
        Arc::new(FailingStore),
        Arc::new(InMemoryCache::new()),
        Arc::new(InMemoryBus::new()),
    )
    .await;
    let router = test_router(state);

    let (status, body) = send(&router, Method::GET, "/health/ready", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["details"]["store"]["status"], "unhealthy");
}

#[tokio::test]
async fn test_readiness_degrades_on_cache_outage() {
    let state = started_state(
        Arc::new(InMemoryRecordStore::new()),
        Arc::new(FailingCache),
        Arc::new(InMemoryBus::new()),
    )
    .await;
    let router = test_router(state);

    let (status, body) = send(&router, Method::GET, "/health/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["details"]["cache"]["status"], "degraded");
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let router = test_router(in_memory_state().await);
    let (status, body) = send(&router, Method::GET, "/openapi.json", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["info"]["title"], "SHELF API");
    assert!(body["paths"]["/products"].is_object());
}
