//! Plugin configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use undraft_protocol::CoordinatorConfig;
use undraft_registry::RegistryConfig;

/// Configuration shared by the server and client plugins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UndraftConfig {
    /// This plugin's package id; never drafted.
    pub plugin_id: String,
    /// Name of the private splice channel.
    pub channel_name: String,
    /// Directory holding installed package files.
    pub package_dir: PathBuf,
    /// Directory scanned for `modinfo.json` files (server only).
    pub metadata_dir: PathBuf,
    /// How long the client holds the first identification waiting for the
    /// server to announce (client only). A server that does not splice sends
    /// a single identification, which is delivered once this expires.
    #[serde(with = "undraft_core::durations::secs")]
    pub hold_timeout: Duration,
    /// Splice coordinator settings (server only).
    pub coordinator: CoordinatorConfig,
    /// Registry probing (server only).
    pub registry: RegistryConfig,
}

impl Default for UndraftConfig {
    fn default() -> Self {
        Self {
            plugin_id: "undrafter".to_string(),
            channel_name: "undrafter".to_string(),
            package_dir: PathBuf::from("Mods"),
            metadata_dir: PathBuf::from("Cache"),
            hold_timeout: Duration::from_secs(5),
            coordinator: CoordinatorConfig::default(),
            registry: RegistryConfig::default(),
        }
    }
}
