//! Error types for SHELF operations

use thiserror::Error;

/// Request validation errors. Always detected before any side effect.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Record store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Record store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Insert failed: {reason}")]
    InsertFailed { reason: String },

    #[error("Query failed: {reason}")]
    QueryFailed { reason: String },
}

/// Cache layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Cache backend error: {reason}")]
    Backend { reason: String },

    #[error("Cache serialization error: {reason}")]
    Serialization { reason: String },
}

/// Notification bus errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("Notification bus unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Publish to {topic} failed: {reason}")]
    PublishFailed { topic: String, reason: String },

    #[error("Subscribe to {topic} failed: {reason}")]
    SubscribeFailed { topic: String, reason: String },

    #[error("Invalid topic {topic:?}: {reason}")]
    InvalidTopic { topic: String, reason: String },

    #[error("Notification bus is closed")]
    Closed,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all SHELF errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ShelfError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for SHELF operations.
pub type ShelfResult<T> = Result<T, ShelfError>;

pub type StorageResult<T> = Result<T, StorageError>;
pub type CacheResult<T> = Result<T, CacheError>;
pub type BusResult<T> = Result<T, BusError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::RequiredFieldMissing {
            field: "name".to_string(),
        };
        assert_eq!(err.to_string(), "Required field missing: name");
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::InsertFailed {
            reason: "name is empty".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Insert failed"));
        assert!(msg.contains("name is empty"));
    }

    #[test]
    fn test_bus_error_display() {
        let err = BusError::PublishFailed {
            topic: "alerts".to_string(),
            reason: "connection reset".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("alerts"));
        assert!(msg.contains("connection reset"));
        assert_eq!(BusError::Closed.to_string(), "Notification bus is closed");
    }

    #[test]
    fn test_shelf_error_from_conversions() {
        let err: ShelfError = CacheError::Unavailable {
            reason: "down".to_string(),
        }
        .into();
        assert!(matches!(err, ShelfError::Cache(_)));
        assert!(err.to_string().starts_with("Cache error:"));

        let err: ShelfError = StorageError::InsertFailed {
            reason: "duplicate key".to_string(),
        }
        .into();
        assert!(matches!(err, ShelfError::Storage(StorageError::InsertFailed { .. })));
    }
}
