//! Application configuration management.
//!
//! A small JSON file in the platform config directory holds the settings
//! that outlive a single invocation: the mirror database location and the
//! batching intervals for index runs. Any load failure falls back to the
//! defaults; configuration must never stop the tool from running.

use anyhow::Result;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

fn default_flush_every() -> u64 {
    200
}

fn default_commit_every() -> u64 {
    2000
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Mirror database location; `None` selects the platform default.
    #[serde(default)]
    pub db_path: Option<PathBuf>,

    /// Files between file-insert batch flushes during indexing.
    #[serde(default = "default_flush_every")]
    pub flush_every: u64,

    /// Files between transaction commits during indexing.
    #[serde(default = "default_commit_every")]
    pub commit_every: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: None,
            flush_every: default_flush_every(),
            commit_every: default_commit_every(),
        }
    }
}

impl Config {
    /// Load the configuration from the default platform-specific path.
    pub fn load() -> Self {
        match Self::load_internal() {
            Ok(config) => config,
            Err(e) => {
                log::debug!("Failed to load config, using defaults: {}", e);
                Self::default()
            }
        }
    }

    fn load_internal() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save the configuration to the default platform-specific path.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Resolve the mirror database path: the configured override, or a
    /// file in the platform data directory, or `./diskdex.db` as a last
    /// resort on systems without a home directory.
    #[must_use]
    pub fn resolve_db_path(&self) -> PathBuf {
        if let Some(path) = &self.db_path {
            return path.clone();
        }
        ProjectDirs::from("com", "diskdex", "diskdex")
            .map(|dirs| dirs.data_dir().join("mirror.db"))
            .unwrap_or_else(|| PathBuf::from("diskdex.db"))
    }

    /// Get the default platform-specific configuration path.
    fn config_path() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("com", "diskdex", "diskdex")
            .ok_or_else(|| anyhow::anyhow!("Failed to determine project directories"))?;
        Ok(project_dirs.config_dir().join("config.json"))
    }
}
