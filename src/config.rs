//! Configuration types for the resident service.
//!
//! Files live under the per-user config directory (`dirs::config_dir()`
//! joined with `resident`), logs under the data directory. Set
//! `RESIDENT_CONFIG_DIR` or `RESIDENT_DATA_DIR` to relocate either root.

use crate::foreground::ForegroundIndicator;
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::path::PathBuf;

const APP_DIR: &str = "resident";
const CONFIG_FILE: &str = "config.toml";
const SETTINGS_FILE: &str = "settings.json";

/// Resolve a per-user root: the env override if set, else `base/resident`.
fn user_root(env_key: &str, base: Option<PathBuf>, fallback: &str) -> PathBuf {
    resolve_root(std::env::var_os(env_key).as_deref(), base, fallback)
}

fn resolve_root(override_dir: Option<&OsStr>, base: Option<PathBuf>, fallback: &str) -> PathBuf {
    match (override_dir, base) {
        (Some(dir), _) if !dir.is_empty() => PathBuf::from(dir),
        (_, Some(base)) => base.join(APP_DIR),
        (_, None) => std::env::temp_dir().join(fallback),
    }
}

fn config_root() -> PathBuf {
    user_root("RESIDENT_CONFIG_DIR", dirs::config_dir(), "resident-config")
}

fn data_root() -> PathBuf {
    user_root("RESIDENT_DATA_DIR", dirs::data_dir(), "resident-data")
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Foreground notification shown while the service is resident.
    pub notification: NotificationConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
    /// Flag store location.
    pub storage: StorageConfig,
}

/// Persistent notification settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Platform notification identifier.
    pub id: u32,
    /// Title text of the notification.
    pub title: String,
    /// Icon resource reference.
    pub icon: String,
    /// Screen reopened when the notification is tapped.
    pub tap_target: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            id: 1,
            title: "Resident service is running".to_owned(),
            icon: "stat_notify_error".to_owned(),
            tap_target: "main".to_owned(),
        }
    }
}

impl NotificationConfig {
    /// Build the indicator handed to the platform on foreground entry.
    #[must_use]
    pub fn indicator(&self) -> ForegroundIndicator {
        ForegroundIndicator {
            notification_id: self.id,
            title: self.title.clone(),
            tap_target: self.tap_target.clone(),
            icon: self.icon.clone(),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// Also write a daily rolling log file under the logs directory.
    pub file_logging: bool,
    /// Override for the log directory (None = `<data dir>/logs`).
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_owned(),
            file_logging: true,
            directory: None,
        }
    }
}

impl LoggingConfig {
    #[must_use]
    pub fn effective_log_dir(&self) -> PathBuf {
        self.directory
            .clone()
            .unwrap_or_else(|| data_root().join("logs"))
    }
}

/// Flag store location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Override for the flag file (None = `<config dir>/settings.json`).
    pub settings_path: Option<PathBuf>,
}

impl StorageConfig {
    #[must_use]
    pub fn effective_settings_path(&self) -> PathBuf {
        self.settings_path
            .clone()
            .unwrap_or_else(|| config_root().join(SETTINGS_FILE))
    }
}

impl ServiceConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::ServiceError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::ServiceError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load from `path` if it exists, otherwise return defaults.
    ///
    /// A present but invalid file is an error rather than silently ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load_or_default(path: &std::path::Path) -> crate::error::Result<Self> {
        if path.is_file() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Returns the default config file path: `<config dir>/config.toml`.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        config_root().join(CONFIG_FILE)
    }
}
