//! Error types and Result aliases for catalog ingestion.
//!
//! This module defines the error hierarchy used throughout the crate.
//! All public functions return `Result<T, Error>` or `Result<T>`.

use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for ingestion operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database/storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Malformed record rejected before any write.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A transactional write failed and was rolled back.
    #[error("failed to persist {entity} '{key}': {source}")]
    Persistence {
        entity: &'static str,
        key: String,
        #[source]
        source: Box<Error>,
    },

    /// Embedding generation error.
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Storage-specific errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The backing store could not be reached, even after a reconnect.
    #[error("connection error: {0}")]
    Connection(String),

    /// `SQLite` database error.
    #[error("database error: {0}")]
    Database(String),

    /// Record not found.
    #[error("not found: {entity} with key '{key}'")]
    NotFound { entity: &'static str, key: String },

    /// Schema migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Stored vector could not be decoded.
    #[error("vector error: {0}")]
    Vector(String),
}

/// Record validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Natural key absent or blank.
    #[error("{entity} record has an empty natural key '{field}'")]
    MissingKey {
        entity: &'static str,
        field: &'static str,
    },

    /// Numeric field outside its allowed range.
    #[error("{field} = {value} is outside {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    /// Input that could not be decoded into a record.
    #[error("malformed record at line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

/// Embedding-specific errors.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// The HTTP request failed or the service returned an error status.
    #[error("embedding request failed: {0}")]
    Request(String),

    /// The response body could not be interpreted.
    #[error("invalid embedding response: {0}")]
    Response(String),

    /// The service returned a vector of unexpected length.
    #[error("expected {expected}-dimensional embedding, got {actual}")]
    Dimension { expected: usize, actual: usize },
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Wrap a failure that happened while persisting the record keyed by `key`.
    pub fn persistence(entity: &'static str, key: impl Into<String>, source: Self) -> Self {
        Self::Persistence {
            entity,
            key: key.into(),
            source: Box::new(source),
        }
    }

    /// Whether the store was unreachable.
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Storage(StorageError::Connection(_)))
    }

    /// Whether the record itself was rejected.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl StorageError {
    /// Create a not-found error.
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            key: key.into(),
        }
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.to_string())
    }
}

impl ValidationError {
    /// Create a missing-key error.
    #[must_use]
    pub const fn missing_key(entity: &'static str, field: &'static str) -> Self {
        Self::MissingKey { entity, field }
    }
}
