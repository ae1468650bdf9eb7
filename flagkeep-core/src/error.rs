//! Error types for flag store operations

use thiserror::Error;

/// Errors surfaced by persistent stores and the cache-aside flag store.
///
/// Nothing below the service layer recovers from these; every failure is
/// propagated to the caller unchanged in kind.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Flag already exists: {name}")]
    AlreadyExists { name: String },

    #[error("Flag not found: {name}")]
    NotFound { name: String },

    #[error("Flag is deleted: {name}")]
    Deleted { name: String },

    #[error("Unknown flags: {}", names.join(", "))]
    UnknownNames { names: Vec<String> },

    #[error("Flag {name} was modified since it was read")]
    PreconditionFailed { name: String },

    #[error("Operation canceled")]
    Canceled,

    #[error("Deadline exceeded during {operation}")]
    DeadlineExceeded { operation: String },

    #[error("Internal store error: {reason}")]
    Internal { reason: String },
}

impl StoreError {
    pub fn already_exists(name: impl Into<String>) -> Self {
        Self::AlreadyExists { name: name.into() }
    }

    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    pub fn deleted(name: impl Into<String>) -> Self {
        Self::Deleted { name: name.into() }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Whether the caller can correct the request (as opposed to an
    /// infrastructure failure).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::AlreadyExists { .. }
                | Self::NotFound { .. }
                | Self::Deleted { .. }
                | Self::UnknownNames { .. }
                | Self::PreconditionFailed { .. }
        )
    }
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

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
