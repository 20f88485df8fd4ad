//! Configuration loading and data root resolution
//!
//! Bootstrap configuration lives in a single TOML file. A missing file is
//! never fatal: callers get `None` and fall back to built-in defaults.
//!
//! Data root resolution follows a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`BGM_DATA_ROOT`)
//! 3. TOML config file (`data_root` key)
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable consulted for the data root
pub const DATA_ROOT_ENV: &str = "BGM_DATA_ROOT";

/// Application directory name used under platform config/data dirs
pub const APP_DIR_NAME: &str = "bgm";

/// Logging configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
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

fn default_log_level() -> String {
    "info".to_string()
}

/// Resolves the directory that named music resources are read from
#[derive(Debug, Clone, Default)]
pub struct DataRootResolver {
    cli_arg: Option<PathBuf>,
    toml_value: Option<PathBuf>,
}

impl DataRootResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Path given on the command line, if any
    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    /// `data_root` value read from the TOML file, if any
    pub fn with_toml_value(mut self, path: Option<PathBuf>) -> Self {
        self.toml_value = path;
        self
    }

    /// Resolve the data root using the priority order documented above.
    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            debug!("Data root from command line: {}", path.display());
            return path.clone();
        }

        if let Ok(path) = std::env::var(DATA_ROOT_ENV) {
            if !path.is_empty() {
                debug!("Data root from {}: {}", DATA_ROOT_ENV, path);
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_value {
            debug!("Data root from config file: {}", path.display());
            return path.clone();
        }

        default_data_root()
    }
}

/// OS-dependent default data root
pub fn default_data_root() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("./bgm_data"))
}

/// Default location of the TOML config file for the platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join("config.toml"))
}

/// Load and deserialize a TOML file.
///
/// # Returns
/// - `Ok(Some(config))` when the file exists and parses
/// - `Ok(None)` when the file does not exist (a warning is logged)
///
/// # Errors
/// - File exists but cannot be read
/// - File contents are not valid TOML for `T`
pub fn load_toml_file<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        warn!(
            "Config file not found at {}, using built-in defaults",
            path.display()
        );
        return Ok(None);
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read {}: {}", path.display(), e))
    })?;
    let parsed = toml::from_str::<T>(&content)?;

    debug!("Loaded config file: {}", path.display());
    Ok(Some(parsed))
}
