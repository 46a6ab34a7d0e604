/// Structured error types for leasehold-core.
///
/// Transient pool errors (`Timeout`, `QueueFull`) are retried inside the
/// query executor; everything else propagates to the caller unchanged.
/// Binary crates (leasehold-cli) wrap these in `anyhow` for reporting.
use thiserror::Error;

use crate::models::PropertyStatus;

/// Main error type for catalog operations
#[derive(Error, Debug)]
pub enum Error {
    /// No pooled connection became free before the deadline
    #[error("timed out waiting for a database connection")]
    Timeout,

    /// Too many callers already waiting for a connection
    #[error("connection queue is full ({limit} waiters)")]
    QueueFull { limit: usize },

    /// The pool has been shut down
    #[error("connection pool is closed")]
    Closed,

    /// Driver-level failure (I/O, syntax, decode) that is not a write rejection
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The store rejected a write
    #[error("{entity} rejected by store: {reason}")]
    Persistence { entity: &'static str, reason: String },

    /// A uniqueness constraint was violated
    #[error("{entity} '{key}' already exists")]
    AlreadyExists { entity: &'static str, key: String },

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    /// Rental guard failed: the property was not AVAILABLE at write time
    #[error("property '{property_id}' is not available (status {status})")]
    NotAvailable {
        property_id: String,
        status: PropertyStatus,
    },

    /// Caller does not own the entity it tried to mutate
    #[error("{entity} '{id}' belongs to another account")]
    Forbidden { entity: &'static str, id: String },

    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// Configuration error
    #[error("configuration error: {reason}")]
    Config { reason: String },
}

/// Result type alias for leasehold-core operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn already_exists(entity: &'static str, key: impl Into<String>) -> Self {
        Self::AlreadyExists {
            entity,
            key: key.into(),
        }
    }

    pub fn persistence(entity: &'static str, reason: impl Into<String>) -> Self {
        Self::Persistence {
            entity,
            reason: reason.into(),
        }
    }

    pub fn forbidden(entity: &'static str, id: impl Into<String>) -> Self {
        Self::Forbidden {
            entity,
            id: id.into(),
        }
    }

    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Pool exhaustion errors that the executor retries with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::QueueFull { .. })
    }

    /// Write rejections, including uniqueness violations.
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence { .. } | Self::AlreadyExists { .. })
    }

    /// Reclassify a driver error raised by a write against `entity`.
    ///
    /// Unique violations become `AlreadyExists { key }`; foreign-key, check
    /// and not-null violations become `Persistence`. Anything else is
    /// returned untouched.
    pub fn on_write(self, entity: &'static str, key: impl Into<String>) -> Self {
        match self {
            Self::Database(sqlx::Error::Database(db_err)) => {
                if db_err.is_unique_violation() {
                    Self::already_exists(entity, key)
                } else if db_err.is_foreign_key_violation()
                    || db_err.is_check_violation()
                    || matches!(db_err.kind(), sqlx::error::ErrorKind::NotNullViolation)
                {
                    Self::persistence(entity, db_err.message())
                } else {
                    Self::Database(sqlx::Error::Database(db_err))
                }
            }
            other => other,
        }
    }

    /// I/O-level driver failures that mean the connection should not be reused.
    pub(crate) fn is_connection_broken(&self) -> bool {
        matches!(
            self,
            Self::Database(sqlx::Error::Io(_) | sqlx::Error::Protocol(_) | sqlx::Error::Tls(_))
        )
    }
}
