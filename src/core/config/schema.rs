//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Global Config
//!
//! Located at (in order of precedence):
//! 1. `$REVFS_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/revfs/config.toml`
//! 3. `~/.revfs/config.toml` (canonical write location)
//!
//! # Repo Config
//!
//! Located at `<repo>/config.toml`.
//!
//! # Validation
//!
//! Config values are validated after parsing (backend names, log levels).

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::backend;

/// Valid `log_level` values.
pub const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Global configuration (user scope).
///
/// # Example
///
/// ```toml
/// author = "alice"
/// log_level = "info"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GlobalConfig {
    /// Author recorded on transactions created by the admin tool
    pub author: Option<String>,

    /// Default tracing level for the admin tool
    pub log_level: Option<String>,
}

impl GlobalConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(level) = &self.log_level {
            if !LOG_LEVELS.contains(&level.as_str()) {
                return Err(ConfigError::InvalidValue(format!(
                    "invalid log_level '{}', must be one of: {}",
                    level,
                    LOG_LEVELS.join(", ")
                )));
            }
        }
        Ok(())
    }
}

/// Repository configuration.
///
/// # Example
///
/// ```toml
/// [storage]
/// backend = "file"
/// fsync = true
///
/// [commit]
/// default_author = "build-bot"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RepoConfig {
    /// Storage backend settings
    pub storage: Option<StorageConfig>,

    /// Commit defaults
    pub commit: Option<CommitConfig>,
}

impl RepoConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(storage) = &self.storage {
            storage.validate()?;
        }
        Ok(())
    }

    /// The config written by `create`.
    pub fn initial() -> Self {
        Self {
            storage: Some(StorageConfig {
                backend: Some(backend::FILE_BACKEND.to_string()),
                fsync: Some(true),
            }),
            commit: None,
        }
    }
}

/// Storage backend settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Backend name; only `file` can back an on-disk repository
    pub backend: Option<String>,

    /// Whether record and journal writes are fsynced
    pub fsync: Option<bool>,
}

impl StorageConfig {
    /// Validate the storage settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(name) = &self.backend {
            if name != backend::FILE_BACKEND {
                return Err(ConfigError::InvalidValue(format!(
                    "invalid storage backend '{}' for an on-disk repository (valid: {})",
                    name,
                    backend::FILE_BACKEND
                )));
            }
        }
        Ok(())
    }
}

/// Commit defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CommitConfig {
    /// Author used when neither the CLI nor the global config names one
    pub default_author: Option<String>,
}
