//! Error types for rallysync.

use thiserror::Error;

/// Errors produced by the rallysync library.
#[derive(Debug, Error)]
pub enum RallyError {
    /// `SQLite` or key-value storage failure.
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration could not be read, parsed or written.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failure.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A requested item does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An operation was built with an invalid shape (empty collection, missing id, ...).
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// The remote store rejected a call or could not be reached.
    #[error("Remote error{}: {message}", status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Remote {
        /// HTTP status, if the remote answered at all.
        status: Option<u16>,
        /// Response body or transport error text.
        message: String,
    },

    /// The queue could not be written to durable storage.
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl RallyError {
    /// Build a remote error without a status code (transport failure).
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Remote {
            status: None,
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for RallyError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

impl From<reqwest::Error> for RallyError {
    fn from(e: reqwest::Error) -> Self {
        Self::Remote {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

impl From<csv::Error> for RallyError {
    fn from(e: csv::Error) -> Self {
        Self::Io(std::io::Error::other(e.to_string()))
    }
}
