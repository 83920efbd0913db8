//! Error types for envwatch-store.

use std::path::PathBuf;

/// Result type for envwatch-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in envwatch-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Monitored location not found in database.
    #[error("Location not found: {0}")]
    LocationNotFound(String),

    /// Invalid timestamp.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(i64),

    /// Stored value could not be interpreted.
    #[error("Corrupt row in {table}: {message}")]
    Corrupt { table: &'static str, message: String },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
