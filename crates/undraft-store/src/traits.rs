//! PackageStore trait: the abstract interface to installed package files.
//!
//! Implementations include a directory store (primary) and an in-memory
//! store (for tests).

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Result, StoreError};

/// Result of a write-once package write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The file was written.
    Written,
    /// A file with this name already exists (idempotent - not an error).
    AlreadyPresent,
    /// The payload was empty; nothing was written.
    EmptyPayload,
}

/// Async interface to the local package store.
///
/// Files are keyed by a flat file name (e.g. `modX_1.0.zip`).
///
/// # Design Notes
///
/// - **Write-once**: `write_if_absent` never overwrites an existing file.
/// - **Validated names**: every method rejects names that fail
///   [`validate_file_name`] with [`StoreError::InvalidFileName`].
#[async_trait]
pub trait PackageStore: Send + Sync {
    /// Check whether a package file exists.
    async fn contains(&self, file_name: &str) -> Result<bool>;

    /// Read a package file. `None` if absent.
    async fn read(&self, file_name: &str) -> Result<Option<Bytes>>;

    /// Write a package file unless one with the same name exists.
    async fn write_if_absent(&self, file_name: &str, data: Bytes) -> Result<WriteOutcome>;

    /// List stored file names, sorted.
    async fn list(&self) -> Result<Vec<String>>;
}

/// Reject names that are empty, contain separators or consist only of dots.
/// Dots inside a name, as in `mod..v2.zip`, are fine.
///
/// Package file names arrive from the network; they must stay inside the
/// store.
pub fn validate_file_name(file_name: &str) -> Result<()> {
    let invalid = file_name.is_empty()
        || file_name.chars().all(|c| c == '.')
        || file_name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(StoreError::InvalidFileName(file_name.to_string()));
    }
    Ok(())
}
