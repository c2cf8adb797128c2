//! Error types for the stratum migration system
//!
//! All fallible operations in this crate return [`StratumResult`]. The error
//! kinds mirror how failures propagate: configuration and directory errors are
//! fatal to the caller, resolution errors are recoverable only in the one
//! documented branch-existence probe, and transaction failures surface after
//! every participating database has been rolled back.

use thiserror::Error;

/// Result type alias for stratum operations
pub type StratumResult<T> = Result<T, StratumError>;

/// Error type for the stratum migration system
#[derive(Debug, Error)]
pub enum StratumError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("template error: {0}")]
    Template(#[from] tera::Error),

    /// Missing or mismatched engine/metadata configuration
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Script directory or template bootstrap failure
    #[error("script directory error: {message}")]
    Directory { message: String },

    /// A revision or branch reference did not resolve
    #[error("could not resolve revision reference '{reference}': {message}")]
    Resolution { reference: String, message: String },

    /// A failure while entering or operating inside a transaction scope.
    /// Every transaction entered for the same call has been rolled back by
    /// the time this surfaces.
    #[error("transaction failure: {message}")]
    Transaction {
        message: String,
        #[source]
        source: Option<Box<StratumError>>,
    },

    #[error("database error: {message}")]
    Database { message: String },

    /// An operation was invoked while its app had no active application
    /// context
    #[error("no active application context for app '{app}'")]
    NoActiveContext { app: String },
}

impl StratumError {
    /// Create a new configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a new script directory error
    pub fn directory(message: impl Into<String>) -> Self {
        Self::Directory {
            message: message.into(),
        }
    }

    /// Create a new resolution error
    pub fn resolution(reference: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Resolution {
            reference: reference.into(),
            message: message.into(),
        }
    }

    /// Create a new database error
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// Wrap an error as a transaction failure
    pub fn transaction(message: impl Into<String>, source: StratumError) -> Self {
        Self::Transaction {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Whether this error is a revision resolution failure. Only the
    /// branch-existence probe during revision creation is allowed to recover
    /// from these.
    pub fn is_resolution(&self) -> bool {
        matches!(self, Self::Resolution { .. })
    }
}

impl From<sqlx::Error> for StratumError {
    fn from(err: sqlx::Error) -> Self {
        StratumError::Database {
            message: err.to_string(),
        }
    }
}
