//! Error types for cellarbook-core

use thiserror::Error;

/// Result type alias using cellarbook-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in cellarbook-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Natural key already taken (brand + blend, item + tin label)
    #[error("Already exists: {0}")]
    Duplicate(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CSV reader/writer error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Remote object storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Preference store error
    #[error("Preferences error: {0}")]
    Preferences(String),
}
