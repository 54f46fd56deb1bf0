//! Persistent configuration for obackup.
//!
//! The configuration lives in a TOML file under the platform config
//! directory. A missing file means defaults; command-line flags override
//! whatever the file says.

use std::env;
use std::fs;
use std::io::{self, Write};
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::Backoff;
use crate::backup::{BackupOptions, DEFAULT_MAX_RETRIES, DEFAULT_PREFIX};
use crate::error::ConfigError;

/// Package name, used as the config directory name.
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
/// Default configuration file name.
pub const CONFIG_NAME: &str = "config.toml";
/// Environment variable overriding `notify.webhook_url`.
pub const WEBHOOK_ENV: &str = "OBACKUP_WEBHOOK_URL";

/// The application configuration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Configuration file version.
    pub version: String,
    pub backup: BackupSection,
    pub notify: NotifySection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            backup: BackupSection::default(),
            notify: NotifySection::default(),
        }
    }
}

/// `[backup]` table.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct BackupSection {
    /// Directory to back up.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    /// Root directory of the object store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<PathBuf>,
    pub base_prefix: String,
    pub max_retries: NonZeroU32,
    pub concurrency: usize,
    pub backoff_unit_ms: u64,
    /// Upper bound for a single backoff wait. Unbounded when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_backoff_ms: Option<u64>,
}

impl Default for BackupSection {
    fn default() -> Self {
        Self {
            source: None,
            destination: None,
            base_prefix: DEFAULT_PREFIX.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            concurrency: 1,
            backoff_unit_ms: 1000,
            max_backoff_ms: None,
        }
    }
}

impl BackupSection {
    pub fn backoff(&self) -> Backoff {
        Backoff::new(Duration::from_millis(self.backoff_unit_ms))
            .with_max_wait(self.max_backoff_ms.map(Duration::from_millis))
    }

    /// Backup options as configured, before command-line overrides.
    pub fn options(&self) -> BackupOptions {
        BackupOptions {
            base_prefix: self.base_prefix.clone(),
            max_retries: self.max_retries,
            concurrency: self.concurrency.max(1),
            backoff: self.backoff(),
            ..BackupOptions::default()
        }
    }
}

/// `[notify]` table.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct NotifySection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

impl NotifySection {
    /// The webhook to deliver reports to, with the environment taking precedence.
    pub fn webhook_url(&self) -> Option<String> {
        env::var(WEBHOOK_ENV)
            .ok()
            .filter(|url| !url.trim().is_empty())
            .or_else(|| self.webhook_url.clone())
    }
}

impl Config {
    /// Loads the configuration file, or the defaults if there is none.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let toml_str = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&toml_str).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Writes the configuration in TOML format, creating the parent directory.
    pub fn write_to(&self, path: &Path) -> Result<(), ConfigError> {
        let toml_str = toml::to_string_pretty(self)?;
        let write = || -> io::Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = fs::File::create(path)?;
            let mut writer = io::BufWriter::new(file);
            writer.write_all(toml_str.as_bytes())?;
            writer.flush()
        };
        write().map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Returns the absolute path to the configuration file.
pub fn config_file() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join(CONFIG_NAME))
}

/// Returns the configuration directory for the application, platform-specific.
#[cfg(not(target_os = "macos"))]
fn config_dir() -> Result<PathBuf, ConfigError> {
    let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
    Ok(config_dir.join(PKG_NAME))
}

/// Returns the configuration directory for the application, platform-specific.
#[cfg(target_os = "macos")]
fn config_dir() -> Result<PathBuf, ConfigError> {
    let home_dir = dirs::home_dir().ok_or(ConfigError::NoConfigDir)?;
    Ok(home_dir.join(".config").join(PKG_NAME))
}

/// Writes a default configuration file if none exists yet.
///
/// Returns `true` if a file was created.
pub fn init_config() -> Result<bool, ConfigError> {
    let path = config_file()?;
    if path.exists() {
        return Ok(false);
    }
    Config::default().write_to(&path)?;
    Ok(true)
}

/// Overwrites the configuration file with defaults.
pub fn reset_config() -> Result<(), ConfigError> {
    Config::default().write_to(&config_file()?)
}
