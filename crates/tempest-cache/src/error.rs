//! Error types for tempest-cache.

use std::path::PathBuf;

/// Result type for tempest-cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tempest-cache.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create the database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Envelope serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unknown box name.
    #[error("Unknown box: {0}")]
    UnknownBox(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
