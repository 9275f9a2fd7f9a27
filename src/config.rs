//! Application configuration, stored as TOML.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base directory for the store (None = in-memory only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Whether to create the store if it doesn't exist.
    pub create_if_missing: bool,

    /// Events buffered per subscription before it is dropped.
    pub subscription_buffer: usize,

    /// Number of computed query snapshots kept in the LRU cache.
    pub snapshot_cache_size: usize,

    /// Collections that reject every write.
    pub read_only_collections: Vec<String>,

    /// fsync the journal after every write.
    pub sync_every_write: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            create_if_missing: true,
            subscription_buffer: 64,
            snapshot_cache_size: 32,
            read_only_collections: Vec::new(),
            sync_every_write: true,
        }
    }
}

impl StoreConfig {
    /// A durable store rooted at `path`.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }
}

/// Who may sign in to the admin dashboard.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Emails allowed to open an admin session.
    pub admins: Vec<String>,
}

impl AdminConfig {
    pub fn is_admin(&self, email: &str) -> bool {
        self.admins.iter().any(|a| a.eq_ignore_ascii_case(email.trim()))
    }
}

/// Top-level configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    pub store: StoreConfig,
    pub admin: AdminConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            store: StoreConfig::default(),
            admin: AdminConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load config, falling back to defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Save config to a TOML file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
