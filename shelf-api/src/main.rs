//! SHELF API Server Entry Point
//!
//! Loads configuration, connects the store, cache and bus, and serves the
//! Axum router until Ctrl-C.

use axum::Router;
use shelf_api::{
    build_backends, build_state, create_router,
    telemetry::{init_tracing, LogFormat},
    ApiError, ApiResult, ServiceConfig,
};

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing(LogFormat::from_env()?)?;

    let config = ServiceConfig::from_env()?;
    let backends = build_backends(&config).await?;
    let state = build_state(&backends, &config).await?;
    let gateway = state.gateway.clone();

    let app: Router = create_router(state, &config);

    let addr = config.bind_addr()?;
    tracing::info!(%addr, "Starting SHELF API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;

    gateway.shutdown().await;
    if let Err(e) = backends.bus.close().await {
        tracing::warn!(error = %e, "Failed to close notification bus");
    }
    tracing::info!("SHELF API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
