//! PostgreSQL record store.
//!
//! Uses a deadpool-postgres connection pool. The schema is a single
//! `products` table created by [`PgRecordStore::migrate`].

use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, PoolError, RecyclingMethod, Runtime};
use shelf_core::{NewProduct, Product, ProductId, StorageError, StorageResult};
use tokio_postgres::NoTls;
use tracing::{debug, error, info};

use super::traits::RecordStore;

const CREATE_PRODUCTS_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS products (
        id          BIGSERIAL PRIMARY KEY,
        name        TEXT NOT NULL CHECK (btrim(name) <> ''),
        description TEXT
    )";

const INSERT_PRODUCT: &str =
    "INSERT INTO products (name, description) VALUES ($1, $2) RETURNING id";

const SELECT_ALL_PRODUCTS: &str = "SELECT id, name, description FROM products ORDER BY id";

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Connection and pool wait timeout
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "shelf".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    ///
    /// Environment variables:
    /// - `SHELF_DB_HOST` (default: localhost)
    /// - `SHELF_DB_PORT` (default: 5432)
    /// - `SHELF_DB_NAME` (default: shelf)
    /// - `SHELF_DB_USER` (default: postgres)
    /// - `SHELF_DB_PASSWORD` (default: empty)
    /// - `SHELF_DB_POOL_SIZE` (default: 16)
    /// - `SHELF_DB_TIMEOUT` in seconds (default: 30)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("SHELF_DB_HOST").unwrap_or(defaults.host),
            port: std::env::var("SHELF_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            dbname: std::env::var("SHELF_DB_NAME").unwrap_or(defaults.dbname),
            user: std::env::var("SHELF_DB_USER").unwrap_or(defaults.user),
            password: std::env::var("SHELF_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("SHELF_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_size),
            timeout: std::env::var("SHELF_DB_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> StorageResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.connect_timeout = Some(self.timeout);

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_cfg = PoolConfig::new(self.max_size);
        pool_cfg.timeouts.wait = Some(self.timeout);
        pool_cfg.timeouts.create = Some(self.timeout);
        cfg.pool = Some(pool_cfg);

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StorageError::Unavailable {
                reason: format!("Failed to create pool: {}", e),
            })
    }

    /// Driver configuration for a dedicated, non-pooled connection.
    pub fn pg_config(&self) -> tokio_postgres::Config {
        let mut cfg = tokio_postgres::Config::new();
        cfg.host(&self.host)
            .port(self.port)
            .dbname(&self.dbname)
            .user(&self.user)
            .password(&self.password)
            .connect_timeout(self.timeout);
        cfg
    }
}

fn pool_error(err: PoolError) -> StorageError {
    error!("Connection pool error: {:?}", err);
    StorageError::Unavailable {
        reason: err.to_string(),
    }
}

// ============================================================================
// RECORD STORE
// ============================================================================

/// Record store backed by a PostgreSQL `products` table.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: Pool,
}

impl PgRecordStore {
    /// Create a new store with the given pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a new store from configuration.
    pub fn from_config(config: &DbConfig) -> StorageResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    /// The underlying pool, shared with other PostgreSQL-backed components.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Create the `products` table if it does not exist.
    pub async fn migrate(&self) -> StorageResult<()> {
        let conn = self.get_conn().await?;
        conn.batch_execute(CREATE_PRODUCTS_TABLE)
            .await
            .map_err(|e| StorageError::QueryFailed {
                reason: format!("migration failed: {}", e),
            })?;
        info!("Products table ready");
        Ok(())
    }

    async fn get_conn(&self) -> StorageResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(pool_error)
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn insert(&self, product: &NewProduct) -> StorageResult<ProductId> {
        product
            .validate()
            .map_err(|e| StorageError::InsertFailed {
                reason: e.to_string(),
            })?;

        let conn = self.get_conn().await?;
        let row = conn
            .query_one(INSERT_PRODUCT, &[&product.name, &product.description])
            .await
            .map_err(|e| {
                error!("Product insert failed: {:?}", e);
                StorageError::InsertFailed {
                    reason: e.to_string(),
                }
            })?;

        let id: ProductId = row.get(0);
        debug!(product_id = id, "Inserted product");
        Ok(id)
    }

    async fn scan_all(&self) -> StorageResult<Vec<Product>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(SELECT_ALL_PRODUCTS, &[])
            .await
            .map_err(|e| {
                error!("Product scan failed: {:?}", e);
                StorageError::QueryFailed {
                    reason: e.to_string(),
                }
            })?;

        Ok(rows
            .iter()
            .map(|row| Product {
                id: row.get("id"),
                name: row.get("name"),
                description: row.get("description"),
            })
            .collect())
    }

    async fn ping(&self) -> StorageResult<()> {
        let conn = self.get_conn().await?;
        conn.simple_query("SELECT 1")
            .await
            .map_err(|e| StorageError::Unavailable {
                reason: e.to_string(),
            })?;
        Ok(())
    }
}
