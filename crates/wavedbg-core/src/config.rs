//! Adapter settings.
//!
//! [`AdapterConfig`] is plain data handed to [`crate::GpuTarget::new`]. The
//! CLI builds it from its config file and environment; embedders can build
//! it directly or parse a `[adapter]`-style TOML table with
//! [`AdapterConfig::from_toml_str`].

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::library::LogLevel;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Precise memory-violation reporting requested for new sessions.
    pub precise_memory: bool,
    /// Log level applied to the library at init and on change.
    pub library_log_level: LogLevel,
    /// Finalize and re-initialize the library when the last session
    /// detaches, so handle numbering restarts.
    pub reset_library_on_last_detach: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            precise_memory: false,
            library_log_level: LogLevel::Warning,
            reset_library_on_last_detach: true,
        }
    }
}

impl AdapterConfig {
    /// Parse from TOML. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("failed to parse adapter config")
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("in {}", path.display()))
    }
}
