//! Encryption settings shared by the library and the CLI.
//!
//! Values come from, in increasing priority: built-in defaults, a serialized
//! config table (the CLI's `[encryption]` TOML section), and environment
//! variables:
//!
//! | Variable                      | Field              |
//! |-------------------------------|--------------------|
//! | `NOTECRYPT_PROTOCOL_VERSION`  | `default_version`  |
//! | `NOTECRYPT_BATCH_CHUNK_SIZE`  | `batch_chunk_size` |
//! | `NOTECRYPT_PBKDF2_COST`       | `pbkdf2_cost`      |

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::envelope::ProtocolVersion;

pub const ENV_PROTOCOL_VERSION: &str = "NOTECRYPT_PROTOCOL_VERSION";
pub const ENV_BATCH_CHUNK_SIZE: &str = "NOTECRYPT_BATCH_CHUNK_SIZE";
pub const ENV_PBKDF2_COST: &str = "NOTECRYPT_PBKDF2_COST";

/// Default number of items per batch chunk.
pub const DEFAULT_BATCH_CHUNK_SIZE: usize = 100;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Encryption settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionConfig {
    /// Protocol version for new writes.
    pub default_version: ProtocolVersion,
    /// Items per chunk for chunked batch decryption.
    pub batch_chunk_size: usize,
    /// PBKDF2 iterations for newly generated key parameters.
    pub pbkdf2_cost: u32,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            default_version: ProtocolVersion::LATEST,
            batch_chunk_size: DEFAULT_BATCH_CHUNK_SIZE,
            pbkdf2_cost: ProtocolVersion::LATEST.cost_minimum(),
        }
    }
}

impl EncryptionConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay values from `lookup` (usually the process environment).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_PROTOCOL_VERSION) {
            self.default_version =
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: ENV_PROTOCOL_VERSION,
                        value: value.clone(),
                        reason: "expected 001, 002 or 003",
                    })?;
        }

        if let Some(value) = lookup(ENV_BATCH_CHUNK_SIZE) {
            self.batch_chunk_size = match value.trim().parse::<usize>() {
                Ok(size) if size > 0 => size,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: ENV_BATCH_CHUNK_SIZE,
                        value,
                        reason: "expected a positive integer",
                    });
                }
            };
        }

        if let Some(value) = lookup(ENV_PBKDF2_COST) {
            self.pbkdf2_cost = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue {
                    key: ENV_PBKDF2_COST,
                    value: value.clone(),
                    reason: "expected an iteration count",
                })?;
        }

        self.validate()
    }

    /// Reject settings that can never work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "batch_chunk_size",
                value: "0".to_owned(),
                reason: "expected a positive integer",
            });
        }
        Ok(())
    }
}
