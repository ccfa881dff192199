//! # Undraft
//!
//! The unified API for Undraft: serve packages that the public registry does
//! not know ("drafted" packages) to connecting clients during the connection
//! handshake, then let the handshake finish as if they had been installed all
//! along.
//!
//! ## Overview
//!
//! - **Server**: [`ServerPlugin`] probes the registry at startup to find the
//!   drafted packages, scans package metadata into a catalog, and installs a
//!   coordinator that withholds drafted packages from the first
//!   identification, transfers the missing files, and re-sends the full
//!   identification.
//! - **Client**: [`ClientPlugin`] holds the host's handshake while the splice
//!   runs, requests missing files, and stores them write-once.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use undraft::{ServerHost, ServerPlugin, UndraftConfig};
//!
//! async fn example<H: ServerHost + 'static>(host: Arc<H>, runner: &dyn undraft::PhaseRunner) -> undraft::Result<()> {
//!     let plugin = ServerPlugin::open(host, UndraftConfig::default())?;
//!
//!     plugin.on_pre_start(runner)?;
//!     let report = plugin.on_start().await?;
//!     println!("{} drafted packages", report.population.drafted);
//!
//!     // ... host accepts connections; the coordinator runs per session ...
//!
//!     plugin.on_dispose();
//!     Ok(())
//! }
//! ```
//!
//! ## Lifecycle
//!
//! ```text
//! on_pre_start  install channel + hooks, re-enter phase runner (SelfInstall)
//! on_start      populate DraftSet, scan Catalog, publish ServerContext
//! connection    reduced identification → splice → full identification
//! on_dispose    remove hooks, clear handlers, reset gate and sessions
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `undraft::core` - Package descriptors, catalog, draft set, phases
//! - `undraft::store` - Local package store and metadata scan
//! - `undraft::registry` - Registry probing
//! - `undraft::protocol` - Splice channel, coordinator, client

pub mod client;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod server;

// Re-export component crates
pub use undraft_core as core;
pub use undraft_protocol as protocol;
pub use undraft_registry as registry;
pub use undraft_store as store;

// Re-export main types for convenience
pub use client::{ClientHost, ClientPlugin, SpliceHold};
pub use config::UndraftConfig;
pub use error::{Result, UndraftError};
pub use lifecycle::{HostPhase, LifecycleGate, PhaseRunner, SelfInstall, SetupOutcome};
pub use server::{ServerHost, ServerPlugin, StartReport};

pub use undraft_core::{
    Catalog, CatalogEntry, DraftSet, HandshakePhase, Identification, PackageDescriptor, PackageId,
    PackageSide, SessionId,
};
pub use undraft_protocol::{HandshakeHost, HookOutcome, IdentificationHooks};
