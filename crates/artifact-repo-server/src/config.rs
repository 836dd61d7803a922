//! Server configuration
//!
//! This module handles hierarchical configuration loading from multiple sources:
//! - Default configuration file
//! - Environment-specific configuration file
//! - Environment variables
//! - Command-line arguments

use artifact_repo_storage::DEFAULT_REGISTRY_FILE;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Repository registry settings
    #[serde(default)]
    pub registry: RegistrySettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Shutdown settings
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

/// Where repositories and the registry configuration live
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySettings {
    /// Base directory for relative repository locations
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Persisted registry configuration; defaults to `registry.toml` in the
    /// base directory
    #[serde(default)]
    pub registry_file: Option<PathBuf>,

    /// Reload the registry when its configuration file changes on disk
    #[serde(default)]
    pub watch_interval_seconds: Option<u64>,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("data/repositories")
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            registry_file: None,
            watch_interval_seconds: None,
        }
    }
}

impl RegistrySettings {
    pub fn registry_file_path(&self) -> PathBuf {
        self.registry_file
            .clone()
            .unwrap_or_else(|| self.base_dir.join(DEFAULT_REGISTRY_FILE))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON formatting
    #[serde(default)]
    pub json_format: bool,

    /// Include thread IDs
    #[serde(default)]
    pub include_thread_ids: bool,

    /// Include target module
    #[serde(default = "default_true")]
    pub include_target: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
            include_thread_ids: false,
            include_target: true,
        }
    }
}

/// Graceful shutdown configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// Time allowed for closing the registry, in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub timeout_seconds: u64,
}

fn default_shutdown_timeout() -> u64 {
    30
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_shutdown_timeout(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from files and environment
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default configuration file (config/default.toml)
    /// 2. Environment-specific file (config/{env}.toml)
    /// 3. Environment variables (ARTIFACT_REPO_*)
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded or parsed
    pub fn load(config_dir: impl Into<PathBuf>, environment: &str) -> Result<Self, ConfigError> {
        let config_dir = config_dir.into();

        let config = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{}.toml", environment))).required(false))
            // e.g., ARTIFACT_REPO_REGISTRY__BASE_DIR=/srv/repositories
            .add_source(
                Environment::with_prefix("ARTIFACT_REPO")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration with defaults if files don't exist
    pub fn load_or_default(config_dir: impl Into<PathBuf>, environment: &str) -> Self {
        Self::load(config_dir, environment).unwrap_or_else(|e| {
            eprintln!("Warning: Failed to load configuration: {}", e);
            eprintln!("Using default configuration");
            Self::default()
        })
    }
}
