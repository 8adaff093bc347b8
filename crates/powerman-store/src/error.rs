//! Error types for powerman-store.

use std::path::PathBuf;

use powerman_types::CounterError;

/// Result type for powerman-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in powerman-store.
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

    /// A stored raw counter is outside the 16-bit range.
    #[error("Corrupt counter in {table}: {source}")]
    CorruptCounter {
        table: &'static str,
        source: CounterError,
    },

    /// Stored timestamp cannot be represented.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(i64),
}
