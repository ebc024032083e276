//! Tracing Subscriber Initialization
//!
//! Installs a `tracing-subscriber` registry with an `EnvFilter` and either a
//! JSON or a human-readable fmt layer.

use std::str::FromStr;

use shelf_core::ConfigError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{ApiError, ApiResult};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "shelf_api=debug,shelf_bus=debug,tower_http=debug,info";

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            _ => Err(ConfigError::InvalidValue {
                field: "SHELF_LOG_FORMAT".to_string(),
                value: s.to_string(),
                reason: "expected 'json' or 'pretty'".to_string(),
            }),
        }
    }
}

impl LogFormat {
    /// Read `SHELF_LOG_FORMAT`, defaulting to JSON.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var("SHELF_LOG_FORMAT") {
            Ok(value) => value.parse(),
            Err(_) => Ok(Self::default()),
        }
    }
}

/// Install the global tracing subscriber.
///
/// Must be called once, before any other tracing happens.
pub fn init_tracing(format: LogFormat) -> ApiResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer().pretty()).try_init(),
    };
    result.map_err(|e| ApiError::internal_error(format!("Failed to init subscriber: {}", e)))?;

    tracing::info!(format = ?format, "Tracing initialized");
    Ok(())
}
