//! Error types for the cash office

use reconciliation_core::ValidationErrors;
use thiserror::Error;
use uuid::Uuid;

/// Result type for cash office operations
pub type Result<T> = std::result::Result<T, Error>;

/// Authentication failures reported by the identity gateway
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Unknown e-mail or wrong password
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Password accepted but the address was never confirmed
    #[error("E-mail not confirmed")]
    EmailNotConfirmed,

    /// Address already has an identity
    #[error("E-mail already registered")]
    EmailAlreadyRegistered,

    /// Password below the configured minimum length
    #[error("Password must have at least {0} characters")]
    WeakPassword(usize),

    /// Token unknown or signed out
    #[error("Invalid session")]
    InvalidSession,

    /// Token past its expiry
    #[error("Session expired")]
    SessionExpired,
}

/// Cash office errors
#[derive(Error, Debug)]
pub enum Error {
    /// Field-level validation failures
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// Uniqueness violation (operator code, e-mail, closing key)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Authentication failure
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Caller lacks the role or ownership for the operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Closing already closed
    #[error("Closing {0} is closed")]
    ClosingLocked(Uuid),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Concurrency error (writer mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Single-field validation error
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = ValidationErrors::new();
        errors.push(field, message);
        Error::Validation(errors)
    }
}

impl From<ValidationErrors> for Error {
    fn from(errors: ValidationErrors) -> Self {
        Error::Validation(errors)
    }
}

impl From<reconciliation_core::Error> for Error {
    fn from(err: reconciliation_core::Error) -> Self {
        match err {
            reconciliation_core::Error::Validation(errors) => Error::Validation(errors),
            reconciliation_core::Error::InvalidOperatorCode(code) => {
                Error::invalid("operator_code", format!("invalid operator code {:?}", code))
            }
            other => Error::invalid("fields", other.to_string()),
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<prometheus::Error> for Error {
    fn from(err: prometheus::Error) -> Self {
        Error::Other(format!("Metrics error: {}", err))
    }
}

#[cfg(feature = "rocksdb")]
impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}
