//! Configuration file management for wavedbg.
//!
//! Provides a TOML-based config file at `~/.config/wavedbg/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use wavedbg_core::AdapterConfig;
use wavedbg_core::library::LogLevel;

pub const ENV_PRECISE_MEMORY: &str = "WAVEDBG_PRECISE_MEMORY";
pub const ENV_LIB_LOG_LEVEL: &str = "WAVEDBG_LIB_LOG_LEVEL";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub adapter: AdapterConfig,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the wavedbg config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/wavedbg` or `~/.config/wavedbg`,
/// also on macOS.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("wavedbg");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("wavedbg")
}

/// Return the path to the wavedbg config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load the config file at `path`. A missing file is `Ok(None)`; a file
/// that exists but does not parse is an error.
pub fn load_config_from(path: &Path) -> Result<Option<ConfigFile>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(Some(config))
}

/// Serialize and write `config` to `path`, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn save_config_to(path: &Path, config: &ConfigFile) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config directory {}", dir.display()))?;
    }

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Settings given on the command line.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub precise_memory: Option<bool>,
    pub lib_log_level: Option<LogLevel>,
}

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct WavedbgConfig {
    pub adapter: AdapterConfig,
    /// The config file that contributed, if one exists.
    pub file: Option<PathBuf>,
}

impl WavedbgConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    pub fn resolve(cli: &CliOverrides) -> Result<Self> {
        let path = config_path();
        let file = load_config_from(&path)?;
        let found = file.is_some().then_some(path);
        let adapter = resolve_adapter(cli, file, |key| std::env::var(key).ok())?;
        Ok(Self {
            adapter,
            file: found,
        })
    }
}

/// The resolution chain over explicit inputs.
///
/// - precise memory: `--precise-memory` > `WAVEDBG_PRECISE_MEMORY` > `adapter.precise_memory` > `false`
/// - library log level: `--lib-log-level` > `WAVEDBG_LIB_LOG_LEVEL` > `adapter.library_log_level` > `warning`
pub fn resolve_adapter(
    cli: &CliOverrides,
    file: Option<ConfigFile>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<AdapterConfig> {
    let mut adapter = file.map(|f| f.adapter).unwrap_or_default();

    if let Some(precise) = cli.precise_memory {
        adapter.precise_memory = precise;
    } else if let Some(raw) = env(ENV_PRECISE_MEMORY) {
        adapter.precise_memory =
            parse_bool(&raw).with_context(|| format!("{ENV_PRECISE_MEMORY} is not a boolean"))?;
    }

    if let Some(level) = cli.lib_log_level {
        adapter.library_log_level = level;
    } else if let Some(raw) = env(ENV_LIB_LOG_LEVEL) {
        adapter.library_log_level = raw
            .parse()
            .with_context(|| format!("{ENV_LIB_LOG_LEVEL} is not a log level"))?;
    }

    Ok(adapter)
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected true or false, got {other:?}"),
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
