//! Error types for registry probing.

use thiserror::Error;

/// Errors that can occur while probing the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// HTTP client error (connect, TLS, body read).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The configured base URL is unusable.
    #[error("invalid registry url: {0}")]
    InvalidUrl(String),

    /// The probe did not answer in time.
    #[error("probe timed out for {0}")]
    Timeout(String),
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
