//! Catalog: package id → (site id, package file name).
//!
//! The catalog is built once from locally discovered metadata and never
//! mutated afterwards. Concurrent reads need no locking.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::PackageId;

/// Where a package lives on the registry site and what its file is called.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// The package this entry describes.
    pub package_id: PackageId,
    /// The registry site's identifier for the package.
    pub site_id: String,
    /// The package file name in the local package store.
    pub file_name: String,
}

impl CatalogEntry {
    pub fn new(package_id: PackageId, site_id: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            package_id,
            site_id: site_id.into(),
            file_name: file_name.into(),
        }
    }
}

/// Immutable package catalog.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: HashMap<PackageId, CatalogEntry>,
}

impl Catalog {
    /// An empty catalog.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Start building a catalog.
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    /// Look up the entry for a package id.
    pub fn lookup(&self, package_id: &str) -> Option<&CatalogEntry> {
        self.entries.get(package_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values()
    }
}

impl FromIterator<CatalogEntry> for Catalog {
    fn from_iter<I: IntoIterator<Item = CatalogEntry>>(iter: I) -> Self {
        let mut builder = Catalog::builder();
        for entry in iter {
            builder.insert(entry);
        }
        builder.build()
    }
}

/// Single-writer builder for [`Catalog`].
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    entries: HashMap<PackageId, CatalogEntry>,
}

impl CatalogBuilder {
    /// Insert an entry. Last writer wins; the replaced entry is returned.
    pub fn insert(&mut self, entry: CatalogEntry) -> Option<CatalogEntry> {
        self.entries.insert(entry.package_id.clone(), entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Freeze the catalog.
    pub fn build(self) -> Catalog {
        Catalog {
            entries: self.entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> PackageId {
        PackageId::new(s).unwrap()
    }

    #[test]
    fn test_lookup_known_and_unknown() {
        let catalog: Catalog = vec![
            CatalogEntry::new(id("a"), "1", "a.zip"),
            CatalogEntry::new(id("b"), "2", "b.zip"),
        ]
        .into_iter()
        .collect();

        assert_eq!(catalog.lookup("a").map(|e| e.file_name.as_str()), Some("a.zip"));
        assert_eq!(catalog.lookup("b").map(|e| e.file_name.as_str()), Some("b.zip"));
        assert!(catalog.lookup("c").is_none());
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn test_last_writer_wins() {
        let mut builder = Catalog::builder();
        assert!(builder.insert(CatalogEntry::new(id("a"), "1", "a_1.0.zip")).is_none());
        let replaced = builder.insert(CatalogEntry::new(id("a"), "1", "a_1.1.zip"));
        assert_eq!(replaced.unwrap().file_name, "a_1.0.zip");

        let catalog = builder.build();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.lookup("a").unwrap().file_name, "a_1.1.zip");
    }

    #[test]
    fn test_empty_catalog() {
        let catalog = Catalog::empty();
        assert!(catalog.is_empty());
        assert!(catalog.lookup("a").is_none());
    }
}
