//! LMDB-backed cache implementation.
//!
//! Uses the heed crate (Rust bindings for LMDB) to keep cache entries in a
//! memory-mapped file, so a warm snapshot survives process restarts.
//!
//! # Entry Format
//!
//! `[expires_at: 8 bytes, little-endian unix millis][utf-8 value]`
//!
//! Expiry is stored as an absolute wall-clock time; an entry read after that
//! instant is treated as absent and removed.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};
use shelf_core::{CacheError, CacheResult};

use super::traits::{CacheBackend, CacheStats};

const EXPIRY_PREFIX_LEN: usize = 8;

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Stored bytes do not follow the entry format.
    #[error("Corrupt cache entry: {0}")]
    Corrupt(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbCacheError> for CacheError {
    fn from(e: LmdbCacheError) -> Self {
        match e {
            LmdbCacheError::EnvOpen(_) | LmdbCacheError::Io(_) => CacheError::Unavailable {
                reason: e.to_string(),
            },
            LmdbCacheError::Corrupt(_) => CacheError::Serialization {
                reason: e.to_string(),
            },
            LmdbCacheError::DbOpen(_) | LmdbCacheError::Transaction(_) => CacheError::Backend {
                reason: e.to_string(),
            },
        }
    }
}

fn txn_error(e: heed::Error) -> LmdbCacheError {
    LmdbCacheError::Transaction(e.to_string())
}

/// LMDB-backed cache.
///
/// # Example
///
/// ```ignore
/// let cache = LmdbCache::new("/var/lib/shelf/cache", 64)?;
/// cache.set("products:all", "[]", Duration::from_secs(3600)).await?;
/// ```
pub struct LmdbCache {
    /// The LMDB environment.
    env: Env,
    /// The main database (single unnamed database).
    db: Database<Str, Bytes>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl LmdbCache {
    /// Create a new LMDB cache.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    /// - Database cannot be created
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment directory is owned by this process for its
        // whole lifetime and is never opened twice concurrently.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_error)?;
        let db: Database<Str, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(txn_error)?;

        Ok(Self {
            env,
            db,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    fn encode(value: &str, ttl: Duration) -> Vec<u8> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = Utc::now().timestamp_millis().saturating_add(ttl_ms);

        let mut bytes = Vec::with_capacity(EXPIRY_PREFIX_LEN + value.len());
        bytes.extend_from_slice(&expires_at.to_le_bytes());
        bytes.extend_from_slice(value.as_bytes());
        bytes
    }

    /// Split a stored entry into its expiry (unix millis) and value.
    fn decode(bytes: &[u8]) -> Result<(i64, String), LmdbCacheError> {
        if bytes.len() < EXPIRY_PREFIX_LEN {
            return Err(LmdbCacheError::Corrupt(format!(
                "entry is {} bytes, shorter than the expiry prefix",
                bytes.len()
            )));
        }
        let (prefix, value) = bytes.split_at(EXPIRY_PREFIX_LEN);
        let expiry_bytes: [u8; EXPIRY_PREFIX_LEN] = prefix
            .try_into()
            .map_err(|_| LmdbCacheError::Corrupt("invalid expiry prefix".into()))?;
        let value = std::str::from_utf8(value)
            .map_err(|e| LmdbCacheError::Corrupt(e.to_string()))?
            .to_string();
        Ok((i64::from_le_bytes(expiry_bytes), value))
    }

    /// Delete `key` only if it is still expired at `now_ms`.
    fn reap_expired(&self, key: &str, now_ms: i64) -> Result<(), LmdbCacheError> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let still_expired = match self.db.get(&wtxn, key).map_err(txn_error)? {
            Some(bytes) => Self::decode(bytes).map(|(expires_at, _)| expires_at <= now_ms)?,
            None => false,
        };
        if still_expired {
            self.db.delete(&mut wtxn, key).map_err(txn_error)?;
        }
        wtxn.commit().map_err(txn_error)
    }
}

#[async_trait]
impl CacheBackend for LmdbCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let now_ms = Utc::now().timestamp_millis();

        let stored = {
            let rtxn = self.env.read_txn().map_err(txn_error)?;
            match self.db.get(&rtxn, key).map_err(txn_error)? {
                Some(bytes) => Some(Self::decode(bytes)?),
                None => None,
            }
        };

        match stored {
            Some((expires_at, value)) if expires_at > now_ms => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(value))
            }
            Some(_) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                self.reap_expired(key, now_ms)?;
                Ok(None)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let bytes = Self::encode(value, ttl);

        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        self.db.put(&mut wtxn, key, &bytes).map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        self.db.delete(&mut wtxn, key).map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        Ok(())
    }

    async fn stats(&self) -> CacheResult<CacheStats> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        let entry_count = self.db.len(&rtxn).map_err(txn_error)?;
        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count,
        })
    }
}
