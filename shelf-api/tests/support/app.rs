use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use shelf_api::{create_router, AppState, CatalogService, FanoutGateway, ServiceConfig};
use shelf_bus::NotificationBus;
use shelf_storage::{CacheBackend, RecordStore};
use tower::ServiceExt;

pub const TEST_CALL_TIMEOUT: Duration = Duration::from_millis(200);

/// Wire a state over the given collaborators without starting the gateway.
pub fn test_state(
    store: Arc<dyn RecordStore>,
    cache: Arc<dyn CacheBackend>,
    bus: Arc<dyn NotificationBus>,
) -> AppState {
    let catalog = Arc::new(CatalogService::new(
        store,
        cache,
        bus.clone(),
        TEST_CALL_TIMEOUT,
    ));
    let gateway = Arc::new(FanoutGateway::new(bus, 64));
    AppState::new(catalog, gateway)
}

/// Same as [`test_state`], with the gateway relaying change events.
pub async fn started_state(
    store: Arc<dyn RecordStore>,
    cache: Arc<dyn CacheBackend>,
    bus: Arc<dyn NotificationBus>,
) -> AppState {
    let state = test_state(store, cache, bus);
    state
        .gateway
        .start()
        .await
        .expect("gateway should start");
    state
}

pub fn test_router(state: AppState) -> Router {
    create_router(state, &ServiceConfig::default())
}

/// Send one request through the router and decode the JSON body, if any.
pub async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    body: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if body.is_some() {
        builder = builder.header("content-type", "application/json");
    }
    let request = builder
        .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
        .expect("request should build");

    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, json)
}
