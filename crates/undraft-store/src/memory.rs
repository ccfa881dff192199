//! In-memory implementation of the PackageStore trait.
//!
//! This is primarily for testing. Same write-once semantics as the
//! directory store, nothing persisted.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Result, StoreError};
use crate::traits::{validate_file_name, PackageStore, WriteOutcome};

/// In-memory package store. Thread-safe via RwLock.
#[derive(Default)]
pub struct MemoryPackageStore {
    files: RwLock<BTreeMap<String, Bytes>>,
}

impl MemoryPackageStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with files.
    pub fn with_files<I, N>(files: I) -> Self
    where
        I: IntoIterator<Item = (N, Bytes)>,
        N: Into<String>,
    {
        let files = files.into_iter().map(|(n, b)| (n.into(), b)).collect();
        Self {
            files: RwLock::new(files),
        }
    }

    fn poisoned() -> StoreError {
        StoreError::Task("memory store lock poisoned".into())
    }
}

#[async_trait]
impl PackageStore for MemoryPackageStore {
    async fn contains(&self, file_name: &str) -> Result<bool> {
        validate_file_name(file_name)?;
        let files = self.files.read().map_err(|_| Self::poisoned())?;
        Ok(files.contains_key(file_name))
    }

    async fn read(&self, file_name: &str) -> Result<Option<Bytes>> {
        validate_file_name(file_name)?;
        let files = self.files.read().map_err(|_| Self::poisoned())?;
        Ok(files.get(file_name).cloned())
    }

    async fn write_if_absent(&self, file_name: &str, data: Bytes) -> Result<WriteOutcome> {
        validate_file_name(file_name)?;
        if data.is_empty() {
            return Ok(WriteOutcome::EmptyPayload);
        }

        let mut files = self.files.write().map_err(|_| Self::poisoned())?;
        if files.contains_key(file_name) {
            return Ok(WriteOutcome::AlreadyPresent);
        }
        files.insert(file_name.to_string(), data);
        Ok(WriteOutcome::Written)
    }

    async fn list(&self) -> Result<Vec<String>> {
        let files = self.files.read().map_err(|_| Self::poisoned())?;
        Ok(files.keys().cloned().collect())
    }
}
