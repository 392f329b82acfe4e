//! Engine configuration loaded from TOML.
//!
//! ```toml
//! [store]
//! strategy = "fast"   # "fast" | "fallback" | "sha256"
//! mutable = true
//! ```
//!
//! Every field is optional; a missing file section falls back to defaults.

use std::path::Path;

use kestrel_common::HashStrategy;
use serde::Deserialize;

use crate::error::ConfigError;

/// Top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// Settings applied to newly created data stores.
    #[serde(default)]
    pub store: StoreConfig,
}

/// Settings for a [`DataStore`](crate::DataStore).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Fingerprint strategy for every buffer in the store.
    pub strategy: HashStrategy,
    /// Whether the store starts out mutable.
    pub mutable: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            strategy: HashStrategy::default(),
            mutable: true,
        }
    }
}

/// Loads engine configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    load_config_from_str(&content)
}

/// Parses engine configuration from a TOML string.
pub fn load_config_from_str(content: &str) -> Result<EngineConfig, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
}
