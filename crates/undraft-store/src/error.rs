//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// File name would escape the store or is otherwise unusable.
    #[error("invalid package file name: {0:?}")]
    InvalidFileName(String),

    /// Store root is missing or not a directory.
    #[error("invalid store root: {0}")]
    InvalidRoot(String),

    /// Metadata file could not be parsed.
    #[error("malformed metadata in {path}: {source}")]
    Metadata {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// Background task failed.
    #[error("task failed: {0}")]
    Task(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
