//! # Undraft Testkit
//!
//! Testing utilities for Undraft.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: scriptable server and client hosts over the in-memory
//!   network, a static registry and a recording phase runner
//! - **Generators**: Proptest strategies for property-based testing
//!
//! ## Test Fixtures
//!
//! Wire a server and a client together:
//!
//! ```rust,no_run
//! use undraft_testkit::fixtures::{packages, TestWorld};
//!
//! # async fn example() {
//! let world = TestWorld::new(packages(&["modX", "modY"])).await;
//! world.server_host.identify(&world.client_id).await;
//! # }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use undraft_testkit::generators::SpliceScenario;
//!
//! proptest! {
//!     #[test]
//!     fn reduced_never_advertises_drafted(scenario: SpliceScenario) {
//!         for id in scenario.expected_reduced() {
//!             prop_assert!(!scenario.drafted.contains(&id));
//!         }
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{
    package, packages, write_modinfo, StaticRegistry, TestClientHost, TestRunner,
    TestServerHost, TestWorld,
};
pub use generators::SpliceScenario;
