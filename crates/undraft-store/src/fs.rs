//! Directory implementation of the PackageStore trait.
//!
//! This is the primary backend: the host's package directory. Writes go
//! through a hidden temporary file that is renamed into place, so an
//! interrupted write never leaves a truncated package that looks installed.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;

use crate::error::{Result, StoreError};
use crate::traits::{validate_file_name, PackageStore, WriteOutcome};

/// A directory of package files.
#[derive(Debug, Clone)]
pub struct DirPackageStore {
    root: PathBuf,
}

impl DirPackageStore {
    /// Open an existing directory as a package store.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(StoreError::InvalidRoot(root.display().to_string()));
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Open a directory, creating it if missing.
    pub fn create(root: impl AsRef<Path>) -> Result<Self> {
        std::fs::create_dir_all(root.as_ref())?;
        Self::open(root)
    }

    /// The store's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, file_name: &str) -> Result<PathBuf> {
        validate_file_name(file_name)?;
        Ok(self.root.join(file_name))
    }

    fn temp_path_of(&self, file_name: &str) -> PathBuf {
        let nonce: u32 = rand::random();
        self.root.join(format!(".{file_name}.{nonce:08x}.part"))
    }
}

#[async_trait]
impl PackageStore for DirPackageStore {
    async fn contains(&self, file_name: &str) -> Result<bool> {
        let path = self.path_of(file_name)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn read(&self, file_name: &str) -> Result<Option<Bytes>> {
        let path = self.path_of(file_name)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_if_absent(&self, file_name: &str, data: Bytes) -> Result<WriteOutcome> {
        let path = self.path_of(file_name)?;
        if data.is_empty() {
            return Ok(WriteOutcome::EmptyPayload);
        }
        if tokio::fs::try_exists(&path).await? {
            return Ok(WriteOutcome::AlreadyPresent);
        }

        let temp = self.temp_path_of(file_name);
        let written = async {
            let mut file = tokio::fs::File::create(&temp).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
            Ok::<_, std::io::Error>(())
        }
        .await;
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }

        // Another writer may have finished first; keep theirs.
        if tokio::fs::try_exists(&path).await? {
            let _ = tokio::fs::remove_file(&temp).await;
            return Ok(WriteOutcome::AlreadyPresent);
        }
        tokio::fs::rename(&temp, &path).await?;

        tracing::debug!("wrote {} ({} bytes)", path.display(), data.len());
        Ok(WriteOutcome::Written)
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }
}
