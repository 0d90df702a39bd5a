//! Configuration types for the rank tracker.

use std::path::{Path, PathBuf};

use rank_search::{LinkConfig, SearchConfig};
use serde::{Deserialize, Serialize};

use crate::error::{RankError, Result};

/// Environment variable that overrides `search.google_api_key`.
pub const ENV_GOOGLE_API_KEY: &str = "RANKWATCH_GOOGLE_API_KEY";
/// Environment variable that overrides `search.google_cx`.
pub const ENV_GOOGLE_CX: &str = "RANKWATCH_GOOGLE_CX";

/// Top-level configuration for the rank tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// `max_rank` used for new keywords and runs when none is given.
    pub default_max_rank: u32,
    /// Where the rank database lives.
    pub database: DatabaseConfig,
    /// Providers, their order and pacing.
    pub search: SearchConfig,
    /// Affiliate table and page-fetch behaviour.
    pub links: LinkConfig,
    /// Task execution layer settings.
    pub tasks: TaskConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            default_max_rank: 50,
            database: DatabaseConfig::default(),
            search: SearchConfig::default(),
            links: LinkConfig::default(),
            tasks: TaskConfig::default(),
        }
    }
}

/// Database location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite file.
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_data_dir().join("rankwatch.db"),
        }
    }
}

/// Task execution layer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Maximum keyword units in flight at once.
    pub concurrency: usize,
    /// Attempts per keyword unit, including the first.
    pub max_attempts: u32,
    /// Delay before a retry, in seconds.
    pub retry_delay_secs: u64,
    /// Double the delay after every failed attempt.
    pub exponential: bool,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_attempts: 2,
            retry_delay_secs: 60,
            exponential: false,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("rankwatch")
}

impl TrackerConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| RankError::Config(e.to_string()))
    }

    /// Load `path` if it exists, defaults otherwise, then apply environment
    /// overrides.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| RankError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/rankwatch/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("rankwatch").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("rankwatch")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/rankwatch-config/config.toml")
        }
    }

    /// Fill API credentials from the environment when set.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(
            std::env::var(ENV_GOOGLE_API_KEY).ok(),
            std::env::var(ENV_GOOGLE_CX).ok(),
        );
    }

    fn apply_overrides(&mut self, api_key: Option<String>, cx: Option<String>) {
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            self.search.google_api_key = Some(key);
        }
        if let Some(cx) = cx.filter(|c| !c.trim().is_empty()) {
            self.search.google_cx = Some(cx);
        }
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<()> {
        self.search.validate()?;
        self.links.validate()?;
        if self.tasks.concurrency == 0 {
            return Err(RankError::Config(
                "tasks.concurrency must be at least 1".into(),
            ));
        }
        if self.tasks.max_attempts == 0 {
            return Err(RankError::Config(
                "tasks.max_attempts must be at least 1".into(),
            ));
        }
        if self.default_max_rank == 0 {
            return Err(RankError::Config(
                "default_max_rank must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
