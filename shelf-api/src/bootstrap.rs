//! Backend construction from [`ServiceConfig`].
//!
//! Everything here runs before the router is built: a backend that cannot
//! connect fails startup instead of the first request.

use std::sync::Arc;

use shelf_bus::{InMemoryBus, NotificationBus, PgNotifyBus};
use shelf_core::{CacheError, ShelfResult};
use shelf_storage::{
    CacheBackend, DbConfig, InMemoryCache, InMemoryRecordStore, LmdbCache, PgRecordStore,
    RecordStore,
};
use tracing::info;

use crate::catalog::CatalogService;
use crate::config::{BusKind, CacheKind, ServiceConfig, StoreKind};
use crate::gateway::FanoutGateway;
use crate::state::AppState;

/// The three collaborators of the catalog, connected and ready.
#[derive(Clone)]
pub struct Backends {
    pub store: Arc<dyn RecordStore>,
    pub cache: Arc<dyn CacheBackend>,
    pub bus: Arc<dyn NotificationBus>,
}

impl Backends {
    /// In-process store, cache and bus.
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(InMemoryRecordStore::new()),
            cache: Arc::new(InMemoryCache::new()),
            bus: Arc::new(InMemoryBus::new()),
        }
    }
}

/// Build the backends selected by `config`.
///
/// PostgreSQL settings are read from `SHELF_DB_*` only when a PostgreSQL
/// backend is selected. The record store and the bus share one pool.
pub async fn build_backends(config: &ServiceConfig) -> ShelfResult<Backends> {
    let db_config = config.needs_postgres().then(DbConfig::from_env);

    let mut pg_store = None;
    let store: Arc<dyn RecordStore> = match (config.store, &db_config) {
        (StoreKind::Postgres, Some(db)) => {
            let store = PgRecordStore::from_config(db)?;
            store.migrate().await?;
            info!(host = %db.host, dbname = %db.dbname, "Using PostgreSQL record store");
            let store = Arc::new(store);
            pg_store = Some(store.clone());
            store
        }
        _ => {
            info!("Using in-memory record store");
            Arc::new(InMemoryRecordStore::new())
        }
    };

    let cache: Arc<dyn CacheBackend> = match config.cache {
        CacheKind::Lmdb => {
            let cache = LmdbCache::new(&config.lmdb_path, config.lmdb_max_mb)
                .map_err(CacheError::from)?;
            info!(path = %config.lmdb_path.display(), "Using LMDB cache");
            Arc::new(cache)
        }
        CacheKind::Memory => {
            info!("Using in-memory cache");
            Arc::new(InMemoryCache::new())
        }
    };

    let bus: Arc<dyn NotificationBus> = match (config.bus, &db_config) {
        (BusKind::Postgres, Some(db)) => {
            let pool = match &pg_store {
                Some(store) => store.pool().clone(),
                None => db.create_pool()?,
            };
            let bus = PgNotifyBus::connect(pool, &db.pg_config()).await?;
            info!(host = %db.host, "Using PostgreSQL LISTEN/NOTIFY bus");
            Arc::new(bus)
        }
        _ => {
            info!("Using in-memory notification bus");
            Arc::new(InMemoryBus::new())
        }
    };

    Ok(Backends { store, cache, bus })
}

/// Wire the catalog and the gateway over `backends` and start relaying.
pub async fn build_state(backends: &Backends, config: &ServiceConfig) -> ShelfResult<AppState> {
    let catalog = Arc::new(CatalogService::new(
        backends.store.clone(),
        backends.cache.clone(),
        backends.bus.clone(),
        config.call_timeout,
    ));
    let gateway = Arc::new(FanoutGateway::new(backends.bus.clone(), config.ws_capacity));
    gateway.start().await?;
    Ok(AppState::new(catalog, gateway))
}
