//! Configuration file support for the notecrypt CLI.
//!
//! Configuration is stored at `~/.config/notecrypt/config.toml` (XDG standard)
//! or `~/Library/Application Support/com.notecrypt.notecrypt/config.toml` on
//! macOS, and can be pointed elsewhere with `--config`.
//!
//! # Example configuration
//!
//! ```toml
//! [defaults]
//! verbosity = 1
//!
//! [encryption]
//! default_version = "003"
//! batch_chunk_size = 100
//! pbkdf2_cost = 110000
//! ```
//!
//! `NOTECRYPT_PROTOCOL_VERSION`, `NOTECRYPT_BATCH_CHUNK_SIZE` and
//! `NOTECRYPT_PBKDF2_COST` override the `[encryption]` table.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use notecrypt_core::EncryptionConfig;

/// Main configuration structure
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// Default settings applied to all commands
    #[serde(default)]
    pub defaults: Defaults,

    /// Encryption settings
    #[serde(default)]
    pub encryption: EncryptionConfig,
}

/// Default settings
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Defaults {
    /// Default verbosity level (0-3)
    pub verbosity: Option<u8>,
}

impl Config {
    /// Load configuration from `explicit`, or from the default path if it
    /// exists, then apply environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = config_path()?;
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    Config::default()
                }
            }
        };

        config
            .encryption
            .apply_overrides(|key| std::env::var(key).ok())
            .context("Invalid encryption setting in environment")?;

        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.encryption.validate()?;
        Ok(config)
    }
}

/// Get the path to the configuration file.
///
/// Uses XDG config directory on Linux, Application Support on macOS.
pub fn config_path() -> Result<PathBuf> {
    let base_dirs = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;

    #[cfg(target_os = "macos")]
    {
        let config_dir = base_dirs
            .home_dir()
            .join("Library/Application Support/com.notecrypt.notecrypt");
        Ok(config_dir.join("config.toml"))
    }

    #[cfg(not(target_os = "macos"))]
    {
        let config_dir = base_dirs.config_dir().join("notecrypt");
        Ok(config_dir.join("config.toml"))
    }
}
