//! Registry configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How the registry is reached and how hard it is probed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Registry root; probes go to `{base_url}/api/mod/{id}`.
    pub base_url: String,
    /// Per-probe timeout.
    #[serde(with = "undraft_core::durations::secs")]
    pub probe_timeout: Duration,
    /// Probes in flight at once.
    pub max_concurrent_probes: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: "https://mods.vintagestory.at".to_string(),
            probe_timeout: Duration::from_secs(10),
            max_concurrent_probes: 4,
        }
    }
}
