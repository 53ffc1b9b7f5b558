//! Bootstrap configuration loading and path resolution
//!
//! Settings come from, highest priority first:
//! 1. Command-line arguments
//! 2. Environment variables (`BINDERY_*`)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)
//!
//! Only the config *file location* is resolved here; merging CLI flags on top
//! of the loaded [`TomlConfig`] is the binary's job.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "BINDERY_CONFIG";

/// Environment variable naming the store root
pub const STORE_ROOT_ENV_VAR: &str = "BINDERY_STORE_ROOT";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Directory the organized store is written under
    ///
    /// If not specified, falls back to environment then OS default
    #[serde(default)]
    pub store_root: Option<PathBuf>,

    /// Path to SQLite session database (optional, in-memory sessions if absent)
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Prefix prepended to every normalized store path (may be empty)
    #[serde(default)]
    pub path_root: String,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Worker pool and progress settings
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// Bibliographic catalog lookups
    #[serde(default = "default_open_library")]
    pub open_library: CatalogSettings,

    /// Comics catalog lookups
    #[serde(default = "default_comic_catalog")]
    pub comic_catalog: CatalogSettings,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            store_root: None,
            database_path: None,
            path_root: String::new(),
            logging: LoggingConfig::default(),
            pipeline: PipelineSettings::default(),
            open_library: default_open_library(),
            comic_catalog: default_comic_catalog(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Pipeline tuning
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSettings {
    /// Number of files processed in parallel
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Capacity of the progress event channel
    #[serde(default = "default_progress_buffer")]
    pub progress_buffer: usize,

    /// Completions between session stat flushes
    #[serde(default = "default_stats_batch_size")]
    pub stats_batch_size: usize,

    /// Maximum time between session stat flushes (milliseconds)
    #[serde(default = "default_stats_batch_interval_ms")]
    pub stats_batch_interval_ms: u64,

    /// Rename destinations that already exist (`name_1.ext`, ...)
    #[serde(default)]
    pub resolve_collisions: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            progress_buffer: default_progress_buffer(),
            stats_batch_size: default_stats_batch_size(),
            stats_batch_interval_ms: default_stats_batch_interval_ms(),
            resolve_collisions: false,
        }
    }
}

/// Remote catalog endpoint settings
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogSettings {
    /// Whether the lookup runs at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Service base URL (override for test doubles and mirrors)
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// API key, for services that require one
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_concurrency() -> usize {
    4
}

fn default_progress_buffer() -> usize {
    100
}

fn default_stats_batch_size() -> usize {
    50
}

fn default_stats_batch_interval_ms() -> u64 {
    500
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_open_library() -> CatalogSettings {
    CatalogSettings {
        enabled: true,
        base_url: "https://openlibrary.org".to_string(),
        timeout_secs: default_timeout_secs(),
        api_key: None,
    }
}

fn default_comic_catalog() -> CatalogSettings {
    CatalogSettings {
        // Requires an API key, so off unless configured
        enabled: false,
        base_url: "https://comicvine.gamespot.com/api".to_string(),
        timeout_secs: default_timeout_secs(),
        api_key: None,
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Resolve and load configuration, falling back to defaults
    ///
    /// An explicitly requested file (CLI or environment) must exist and parse.
    /// The platform default location is optional.
    pub fn resolve(cli_path: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_path, CONFIG_ENV_VAR) {
            ConfigSource::Explicit(path) => Self::load(&path),
            ConfigSource::Default(path) => match Self::load(&path) {
                Ok(config) => Ok(config),
                Err(e) => {
                    warn!("Ignoring default config file {}: {}", path.display(), e);
                    Ok(Self::default())
                }
            },
            ConfigSource::BuiltIn => {
                debug!("No config file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    /// Store root with ENV and OS-default fallbacks
    pub fn resolve_store_root(&self, cli_arg: Option<&Path>) -> PathBuf {
        if let Some(path) = cli_arg {
            return path.to_path_buf();
        }
        if let Ok(path) = std::env::var(STORE_ROOT_ENV_VAR) {
            return PathBuf::from(path);
        }
        if let Some(path) = &self.store_root {
            return path.clone();
        }
        default_store_root()
    }
}

/// Where configuration was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Named on the command line or in the environment
    Explicit(PathBuf),
    /// Platform config directory
    Default(PathBuf),
    /// Nothing on disk
    BuiltIn,
}

/// Config file resolution: CLI → ENV → `<config_dir>/bindery/config.toml`
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> ConfigSource {
    if let Some(path) = cli_arg {
        return ConfigSource::Explicit(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return ConfigSource::Explicit(PathBuf::from(path));
        }
    }

    match dirs::config_dir().map(|d| d.join("bindery").join("config.toml")) {
        Some(path) if path.exists() => ConfigSource::Default(path),
        _ => ConfigSource::BuiltIn,
    }
}

/// OS-dependent default store root
fn default_store_root() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("bindery").join("store"))
        .unwrap_or_else(|| PathBuf::from("./bindery_store"))
}
