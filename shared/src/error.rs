//! Error types for the diary agent services.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the diary agent services.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or contradictory request fields
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Missing record, or a record the caller does not own
    #[error("Not found: {0}")]
    NotFound(String),

    /// Model, search, synthesis, or storage backend failure
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::InvalidInput(_) => 400,
            Error::NotFound(_) => 404,
            Error::Upstream(_) => 502,
            _ => 500,
        }
    }
}
