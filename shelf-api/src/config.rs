//! Service Configuration Module
//!
//! Configuration is loaded from environment variables with defaults suited
//! to a single-node development setup: in-memory store, cache and bus.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use shelf_core::ConfigError;

// ============================================================================
// BACKEND SELECTION
// ============================================================================

/// Record store implementation to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreKind {
    #[default]
    Memory,
    Postgres,
}

/// Cache implementation to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheKind {
    #[default]
    Memory,
    Lmdb,
}

/// Notification bus transport to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusKind {
    #[default]
    Memory,
    Postgres,
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

impl FromStr for StoreKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            _ => Err(invalid("SHELF_STORE", s, "expected 'memory' or 'postgres'")),
        }
    }
}

impl FromStr for CacheKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "lmdb" => Ok(Self::Lmdb),
            _ => Err(invalid("SHELF_CACHE", s, "expected 'memory' or 'lmdb'")),
        }
    }
}

impl FromStr for BusKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            _ => Err(invalid("SHELF_BUS", s, "expected 'memory' or 'postgres'")),
        }
    }
}

// ============================================================================
// SERVICE CONFIGURATION
// ============================================================================

/// Service configuration: listener, timeouts, CORS and backend selection.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Interface to bind.
    pub bind_host: String,

    /// Port to listen on.
    pub port: u16,

    /// Upper bound on every store, cache and bus call.
    pub call_timeout: Duration,

    /// Relayed messages buffered per WebSocket session before it lags.
    pub ws_capacity: usize,

    /// Allowed CORS origins. Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,

    pub store: StoreKind,
    pub cache: CacheKind,
    pub bus: BusKind,

    /// LMDB environment directory, used when `cache` is `Lmdb`.
    pub lmdb_path: PathBuf,

    /// LMDB map size in megabytes.
    pub lmdb_max_mb: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: 3000,
            call_timeout: Duration::from_millis(5000),
            ws_capacity: 1024,
            cors_origins: Vec::new(),
            store: StoreKind::default(),
            cache: CacheKind::default(),
            bus: BusKind::default(),
            lmdb_path: PathBuf::from("./data/cache"),
            lmdb_max_mb: 256,
        }
    }
}

impl ServiceConfig {
    /// Create ServiceConfig from environment variables.
    ///
    /// Environment variables:
    /// - `SHELF_API_BIND`: Interface to bind (default: 0.0.0.0)
    /// - `PORT` or `SHELF_API_PORT`: Listen port (default: 3000)
    /// - `SHELF_CALL_TIMEOUT_MS`: Per-call timeout for collaborators (default: 5000)
    /// - `SHELF_WS_CAPACITY`: Per-session relay buffer (default: 1024)
    /// - `SHELF_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `SHELF_STORE`: `memory` or `postgres` (default: memory)
    /// - `SHELF_CACHE`: `memory` or `lmdb` (default: memory)
    /// - `SHELF_BUS`: `memory` or `postgres` (default: memory)
    /// - `SHELF_LMDB_PATH`: LMDB directory (default: ./data/cache)
    /// - `SHELF_LMDB_MAX_MB`: LMDB map size (default: 256)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port = match lookup("PORT").or_else(|| lookup("SHELF_API_PORT")) {
            Some(value) => value
                .parse::<u16>()
                .map_err(|_| invalid("SHELF_API_PORT", &value, "expected a port number"))?,
            None => defaults.port,
        };

        let call_timeout = match lookup("SHELF_CALL_TIMEOUT_MS") {
            Some(value) => match value.parse::<u64>() {
                Ok(ms) if ms > 0 => Duration::from_millis(ms),
                _ => {
                    return Err(invalid(
                        "SHELF_CALL_TIMEOUT_MS",
                        &value,
                        "expected a positive number of milliseconds",
                    ))
                }
            },
            None => defaults.call_timeout,
        };

        let ws_capacity = match lookup("SHELF_WS_CAPACITY") {
            Some(value) => match value.parse::<usize>() {
                Ok(capacity) if capacity > 0 => capacity,
                _ => {
                    return Err(invalid(
                        "SHELF_WS_CAPACITY",
                        &value,
                        "expected a positive integer",
                    ))
                }
            },
            None => defaults.ws_capacity,
        };

        let cors_origins = lookup("SHELF_CORS_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let store = lookup("SHELF_STORE")
            .map(|s| s.parse::<StoreKind>())
            .transpose()?
            .unwrap_or(defaults.store);
        let cache = lookup("SHELF_CACHE")
            .map(|s| s.parse::<CacheKind>())
            .transpose()?
            .unwrap_or(defaults.cache);
        let bus = lookup("SHELF_BUS")
            .map(|s| s.parse::<BusKind>())
            .transpose()?
            .unwrap_or(defaults.bus);

        let lmdb_max_mb = match lookup("SHELF_LMDB_MAX_MB") {
            Some(value) => value
                .parse::<usize>()
                .map_err(|_| invalid("SHELF_LMDB_MAX_MB", &value, "expected a size in megabytes"))?,
            None => defaults.lmdb_max_mb,
        };

        Ok(Self {
            bind_host: lookup("SHELF_API_BIND").unwrap_or(defaults.bind_host),
            port,
            call_timeout,
            ws_capacity,
            cors_origins,
            store,
            cache,
            bus,
            lmdb_path: lookup("SHELF_LMDB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.lmdb_path),
            lmdb_max_mb,
        })
    }

    /// Socket address to listen on.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.bind_host, self.port);
        addr.parse::<SocketAddr>()
            .map_err(|e| invalid("SHELF_API_BIND", &addr, &e.to_string()))
    }

    /// Whether any backend needs a PostgreSQL connection.
    pub fn needs_postgres(&self) -> bool {
        self.store == StoreKind::Postgres || self.bus == BusKind::Postgres
    }
}
