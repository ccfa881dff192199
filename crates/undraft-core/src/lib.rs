//! # Undraft Core
//!
//! Pure primitives for Undraft: package descriptors, the package catalog,
//! the draft set and the per-session handshake phase machine.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`PackageDescriptor`] - A package as the host advertises it
//! - [`Identification`] - The host's identification packet (package list)
//! - [`Catalog`] - Immutable package id → (site id, file name) mapping
//! - [`DraftSet`] - Packages withheld from the first identification
//! - [`HandshakePhase`] / [`PhaseTracker`] - Monotonic per-session phases
//!
//! ## Lifetimes
//!
//! [`Catalog`] and [`DraftSet`] are built once through their builders and are
//! read-only afterwards. Share them behind an `Arc`.

pub mod catalog;
pub mod draft;
pub mod durations;
pub mod error;
pub mod phase;
pub mod types;

pub use catalog::{Catalog, CatalogBuilder, CatalogEntry};
pub use draft::{DraftSet, DraftSetBuilder};
pub use error::{CoreError, PhaseError};
pub use phase::{HandshakePhase, PhaseTracker};
pub use types::{Identification, PackageDescriptor, PackageId, PackageSide, SessionId};
