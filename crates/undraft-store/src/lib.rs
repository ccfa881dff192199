//! # Undraft Store
//!
//! Storage for Undraft: the local package store (installed package files,
//! keyed by file name) and the metadata scan that builds the [`Catalog`].
//!
//! ## Key Types
//!
//! - [`PackageStore`] - The async trait for package file access
//! - [`DirPackageStore`] - A directory of package files
//! - [`MemoryPackageStore`] - In-memory store for tests
//! - [`WriteOutcome`] - Result of a write-once package write
//! - [`scan_metadata`] - Builds a [`Catalog`] from `modinfo.json` files
//!
//! ## Usage
//!
//! ```rust,no_run
//! use undraft_store::{DirPackageStore, PackageStore, WriteOutcome};
//!
//! async fn example() {
//!     let store = DirPackageStore::open("Mods").unwrap();
//!
//!     // let outcome = store.write_if_absent("modX_1.0.zip", bytes).await.unwrap();
//!     // assert_eq!(outcome, WriteOutcome::Written);
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Write-once**: writing a file that already exists is a no-op
//! - **Flat namespace**: file names never contain path separators
//!
//! [`Catalog`]: undraft_core::Catalog

pub mod error;
pub mod fs;
pub mod memory;
pub mod metadata;
pub mod traits;

pub use error::{Result, StoreError};
pub use fs::DirPackageStore;
pub use memory::MemoryPackageStore;
pub use metadata::{package_file_name, scan_metadata, ModInfo, MODINFO_FILE_NAME};
pub use traits::{validate_file_name, PackageStore, WriteOutcome};
