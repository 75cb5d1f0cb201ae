//! Storage error types

use thiserror::Error;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage error types
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend connection failed
    #[error("Storage connection error: {0}")]
    Connection(String),

    /// Schema creation / migration failed
    #[error("Storage migration error: {0}")]
    Migration(String),

    /// Query execution failed
    #[error("Storage query error: {0}")]
    Query(String),

    /// Stored row could not be decoded into its domain type
    #[error("Stored record is corrupt: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        Self::Query(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Corrupt(err.to_string())
    }
}

impl From<StorageError> for swarmgate_types::BrokerError {
    fn from(err: StorageError) -> Self {
        swarmgate_types::BrokerError::Internal(err.to_string())
    }
}
