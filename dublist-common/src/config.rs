//! Bootstrap configuration loading and root folder resolution
//!
//! Root folder priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable `DUBLIST_ROOT`
//! 3. TOML config file `root_folder`
//! 4. Compiled default `./dubs`
//!
//! A missing TOML file is not an error: defaults are used and a warning is logged.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const ROOT_ENV_VAR: &str = "DUBLIST_ROOT";
pub const CONFIG_ENV_VAR: &str = "DUBLIST_CONFIG";
const DEFAULT_ROOT_FOLDER: &str = "dubs";
const CONFIG_FILE_NAME: &str = "dublist.toml";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    /// Data root holding sources/, cache/ and final/
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Per external system settings, keyed by system name ("mal", "jikan", ...)
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub scan: ScanConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Settings for one external system
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    /// API credential, where the system needs one
    #[serde(default)]
    pub client_id: Option<String>,

    /// Minimum spacing between two calls, overrides the built-in interval
    #[serde(default)]
    pub min_interval_ms: Option<u64>,
}

/// Retry schedule shared by every call harness
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Total attempts for transient failures
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    /// Sleep after each failed attempt; the last entry repeats
    #[serde(default = "default_delays_secs")]
    pub delays_secs: Vec<u64>,

    /// Sleep after a rate-limited reply without a server delay; the last entry repeats
    #[serde(default = "default_rate_limit_fallback_secs")]
    pub rate_limit_fallback_secs: Vec<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            delays_secs: default_delays_secs(),
            rate_limit_fallback_secs: default_rate_limit_fallback_secs(),
        }
    }
}

fn default_attempts() -> u32 {
    4
}

fn default_delays_secs() -> Vec<u64> {
    vec![10, 60, 120]
}

fn default_rate_limit_fallback_secs() -> Vec<u64> {
    vec![5, 15, 30, 60]
}

/// Crawl policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanConfig {
    /// Flush after this many ids (id-range scans)
    #[serde(default = "default_checkpoint_every_ids")]
    pub checkpoint_every_ids: usize,

    /// Flush after this many pages (paged scans)
    #[serde(default = "default_checkpoint_every_pages")]
    pub checkpoint_every_pages: usize,

    /// Stop after this many consecutive verified-absent ids
    #[serde(default = "default_early_stop_after")]
    pub early_stop_after: u32,

    /// Maximum in-flight detail fetches for list-then-detail providers
    #[serde(default = "default_fan_out")]
    pub fan_out: usize,

    /// Capacity of the per-run sub-resource memo
    #[serde(default = "default_memo_capacity")]
    pub memo_capacity: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            checkpoint_every_ids: default_checkpoint_every_ids(),
            checkpoint_every_pages: default_checkpoint_every_pages(),
            early_stop_after: default_early_stop_after(),
            fan_out: default_fan_out(),
            memo_capacity: default_memo_capacity(),
        }
    }
}

fn default_checkpoint_every_ids() -> usize {
    100
}

fn default_checkpoint_every_pages() -> usize {
    10
}

fn default_early_stop_after() -> u32 {
    500
}

fn default_fan_out() -> usize {
    15
}

fn default_memo_capacity() -> usize {
    5000
}

impl TomlConfig {
    /// Settings for one external system, empty when not configured
    pub fn provider(&self, name: &str) -> ProviderConfig {
        self.providers.get(name).cloned().unwrap_or_default()
    }
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config = toml::from_str(&content)?;
    Ok(config)
}

/// Locate the config file: CLI → `DUBLIST_CONFIG` → `<config dir>/dublist/dublist.toml`
///
/// The first two are returned even when the file does not exist so that the
/// caller can report it; the platform default is only returned if present.
pub fn locate_config_file(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    dirs::config_dir()
        .map(|d| d.join("dublist").join(CONFIG_FILE_NAME))
        .filter(|p| p.exists())
}

/// Load bootstrap configuration, falling back to defaults when no file exists
///
/// A file that exists but fails to parse is an error.
pub fn load_bootstrap_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    match locate_config_file(cli_arg) {
        Some(path) if path.exists() => {
            let config = load_toml_config(&path)?;
            info!("Loaded config from {}", path.display());
            Ok(config)
        }
        Some(path) => {
            warn!("Config file {} not found, using defaults", path.display());
            Ok(TomlConfig::default())
        }
        None => Ok(TomlConfig::default()),
    }
}

/// Resolve the data root following the priority order in the module docs
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(ROOT_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    // Priority 4: Compiled default
    PathBuf::from(DEFAULT_ROOT_FOLDER)
}
