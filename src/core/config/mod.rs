//! core::config
//!
//! Configuration schema and loading.
//!
//! # Overview
//!
//! There are two configuration scopes:
//! - **Global**: User-level settings (author, log level)
//! - **Repo**: Repository-level settings (storage, commit defaults)
//!
//! # Precedence
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Global config file
//! 3. Repo config file
//! 4. CLI flags (not handled here)
//!
//! # Global Config Locations
//!
//! Searched in order:
//! 1. `$REVFS_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/revfs/config.toml`
//! 3. `~/.revfs/config.toml` (canonical write location)
//!
//! # Example
//!
//! ```no_run
//! use revfs::core::config::Config;
//! use std::path::Path;
//!
//! let result = Config::load(Some(Path::new("/srv/repo"))).unwrap();
//! let config = result.config;
//!
//! println!("fsync: {}", config.fsync());
//! if let Some(author) = config.author() {
//!     println!("author: {}", author);
//! }
//! ```

pub mod schema;

pub use schema::{CommitConfig, GlobalConfig, RepoConfig, StorageConfig};

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::paths::RepoPaths;

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("failed to write config file '{path}': {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config value: {0}")]
    InvalidValue(String),

    #[error("home directory not found")]
    NoHomeDir,
}

/// Result of loading configuration.
#[derive(Debug)]
pub struct ConfigLoadResult {
    /// The loaded configuration.
    pub config: Config,
}

/// Merged configuration from all sources.
///
/// Accessors apply precedence rules automatically.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Global configuration
    pub global: GlobalConfig,
    /// Repository configuration (if a repository was given)
    pub repo: Option<RepoConfig>,
    global_path: Option<PathBuf>,
    repo_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// If `repo_root` is provided, also loads `<repo_root>/config.toml`.
    ///
    /// # Errors
    ///
    /// Returns an error if config files exist but cannot be parsed.
    /// Missing config files are not an error (defaults are used).
    pub fn load(repo_root: Option<&Path>) -> Result<ConfigLoadResult, ConfigError> {
        let global_path = Self::find_global();
        Self::load_from(global_path.as_deref(), repo_root)
    }

    /// Load configuration from an explicit global config path.
    ///
    /// Used by [`Config::load`] after locating the global file, and directly
    /// by tests that must not depend on the environment.
    pub fn load_from(
        global_path: Option<&Path>,
        repo_root: Option<&Path>,
    ) -> Result<ConfigLoadResult, ConfigError> {
        let (global, global_found) = match global_path {
            Some(path) if path.exists() => (read_toml(path)?, Some(path.to_path_buf())),
            _ => (GlobalConfig::default(), None),
        };

        let (repo, repo_found) = match repo_root {
            Some(root) => {
                let path = RepoPaths::new(root.to_path_buf()).config_path();
                if path.exists() {
                    (Some(read_toml::<RepoConfig>(&path)?), Some(path))
                } else {
                    (None, None)
                }
            }
            None => (None, None),
        };

        global.validate()?;
        if let Some(ref r) = repo {
            r.validate()?;
        }

        Ok(ConfigLoadResult {
            config: Config {
                global,
                repo,
                global_path: global_found,
                repo_path: repo_found,
            },
        })
    }

    /// Locate the global config file, if any exists.
    fn find_global() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("REVFS_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("revfs/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        let path = dirs::home_dir()?.join(".revfs/config.toml");
        path.exists().then_some(path)
    }

    /// Get the canonical path for global config.
    ///
    /// Returns `~/.revfs/config.toml`.
    pub fn global_config_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".revfs/config.toml"))
    }

    /// Write repo config atomically.
    ///
    /// Creates parent directories if needed. Uses atomic write
    /// (write to temp file, then rename) to prevent corruption.
    pub fn write_repo(repo_root: &Path, config: &RepoConfig) -> Result<PathBuf, ConfigError> {
        let path = RepoPaths::new(repo_root.to_path_buf()).config_path();
        write_config_atomic(&path, config)?;
        Ok(path)
    }

    // =========================================================================
    // Accessor methods with precedence
    // =========================================================================

    /// Author for new transactions.
    ///
    /// The global `author` wins over the repo's `commit.default_author`,
    /// since it names the person running the tool.
    pub fn author(&self) -> Option<&str> {
        self.global.author.as_deref().or_else(|| {
            self.repo
                .as_ref()
                .and_then(|r| r.commit.as_ref())
                .and_then(|c| c.default_author.as_deref())
        })
    }

    /// Whether backend writes are fsynced.
    ///
    /// Defaults to `true` if not configured.
    pub fn fsync(&self) -> bool {
        self.repo
            .as_ref()
            .and_then(|r| r.storage.as_ref())
            .and_then(|s| s.fsync)
            .unwrap_or(true)
    }

    /// Storage backend for an on-disk repository.
    ///
    /// Defaults to `file` if not configured.
    pub fn storage_backend(&self) -> &str {
        self.repo
            .as_ref()
            .and_then(|r| r.storage.as_ref())
            .and_then(|s| s.backend.as_deref())
            .unwrap_or(crate::backend::FILE_BACKEND)
    }

    /// Default tracing level.
    ///
    /// Defaults to `warn` if not configured.
    pub fn log_level(&self) -> &str {
        self.global.log_level.as_deref().unwrap_or("warn")
    }

    /// Path the global config was loaded from.
    pub fn global_config_loaded_from(&self) -> Option<&Path> {
        self.global_path.as_deref()
    }

    /// Path the repo config was loaded from.
    pub fn repo_config_loaded_from(&self) -> Option<&Path> {
        self.repo_path.as_deref()
    }
}

fn read_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn write_config_atomic<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let contents =
        toml::to_string_pretty(config).map_err(|e| ConfigError::InvalidValue(e.to_string()))?;

    let temp_path = path.with_extension("toml.tmp");
    let mut file = fs::File::create(&temp_path).map_err(|e| ConfigError::WriteError {
        path: temp_path.clone(),
        source: e,
    })?;

    file.write_all(contents.as_bytes())
        .map_err(|e| ConfigError::WriteError {
            path: temp_path.clone(),
            source: e,
        })?;

    file.sync_all().map_err(|e| ConfigError::WriteError {
        path: temp_path.clone(),
        source: e,
    })?;

    fs::rename(&temp_path, path).map_err(|e| ConfigError::WriteError {
        path: path.to_path_buf(),
        source: e,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_empty_defaults() {
        let result = Config::load_from(None, None).unwrap();
        let config = result.config;

        assert!(config.author().is_none());
        assert!(config.fsync());
        assert_eq!(config.log_level(), "warn");
        assert!(config.global_config_loaded_from().is_none());
    }

    #[test]
    fn load_global_from_path() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("config.toml");
        fs::write(
            &config_path,
            r#"
            author = "alice"
            log_level = "debug"
            "#,
        )
        .unwrap();

        let config = Config::load_from(Some(&config_path), None).unwrap().config;
        assert_eq!(config.author(), Some("alice"));
        assert_eq!(config.log_level(), "debug");
        assert_eq!(config.global_config_loaded_from(), Some(config_path.as_path()));
    }

    #[test]
    fn load_repo_config() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("config.toml"),
            r#"
            [storage]
            backend = "file"
            fsync = false

            [commit]
            default_author = "build-bot"
            "#,
        )
        .unwrap();

        let config = Config::load_from(None, Some(temp.path())).unwrap().config;
        assert!(!config.fsync());
        assert_eq!(config.author(), Some("build-bot"));
    }

    #[test]
    fn global_author_overrides_repo_default() {
        let config = Config {
            global: GlobalConfig {
                author: Some("alice".into()),
                ..Default::default()
            },
            repo: Some(RepoConfig {
                commit: Some(CommitConfig {
                    default_author: Some("build-bot".into()),
                }),
                ..Default::default()
            }),
            global_path: None,
            repo_path: None,
        };
        assert_eq!(config.author(), Some("alice"));
    }

    #[test]
    fn write_repo_config_atomic() {
        let temp = TempDir::new().unwrap();
        let path = Config::write_repo(temp.path(), &RepoConfig::initial()).unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("toml.tmp").exists());
        let loaded = Config::load_from(None, Some(temp.path())).unwrap();
        assert!(loaded.config.fsync());
        assert_eq!(loaded.config.repo_config_loaded_from(), Some(path.as_path()));
    }

    #[test]
    fn malformed_repo_config_rejected() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("config.toml"), "[storage\nbackend = ").unwrap();

        let result = Config::load_from(None, Some(temp.path()));
        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
    }
}
