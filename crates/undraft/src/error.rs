//! Error types for the plugins.

use thiserror::Error;

use undraft_core::CoreError;
use undraft_protocol::ProtocolError;
use undraft_registry::RegistryError;
use undraft_store::StoreError;

/// Errors that can occur in plugin lifecycle operations.
#[derive(Debug, Error)]
pub enum UndraftError {
    /// Core type error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Package store or metadata error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Registry error.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Splice protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The host's phase runner failed.
    #[error("phase runner error: {0}")]
    PhaseRunner(String),

    /// A background task panicked or was cancelled.
    #[error("task failed: {0}")]
    Task(String),
}

/// Result type for plugin operations.
pub type Result<T> = std::result::Result<T, UndraftError>;
