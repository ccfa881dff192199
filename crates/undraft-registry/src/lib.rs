//! # Undraft Registry
//!
//! Decides which packages are drafted by asking the public package
//! registry whether it knows them.
//!
//! A package the registry reports as "not found" cannot be downloaded by
//! clients on their own, so the server withholds it from the first
//! identification and ships it over the splice channel instead.
//!
//! ## Fail-open
//!
//! Any probe failure (network error, timeout, unexpected response) counts as
//! "exists". A missing draft only loses the optimization; it never blocks a
//! connection.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use undraft_registry::{populate_draft_set, HttpRegistry, RegistryConfig};
//!
//! async fn example(packages: Vec<undraft_core::PackageDescriptor>) {
//!     let config = RegistryConfig::default();
//!     let registry = Arc::new(HttpRegistry::new(&config).unwrap());
//!     let (draft_set, report) = populate_draft_set(registry, &packages, "undrafter", &config).await;
//!     println!("{} of {} packages drafted", report.drafted, report.probed);
//! }
//! ```

pub mod config;
pub mod error;
pub mod populate;
pub mod probe;

pub use config::RegistryConfig;
pub use error::{RegistryError, Result};
pub use populate::{populate_draft_set, PopulationReport};
pub use probe::{classify_response, HttpRegistry, ProbeOutcome, RegistryProbe};
