use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::mediator::ShortCircuit;

/// Main configuration structure
///
/// This gets loaded from the config file, then CLI args and env vars win.
/// Priority: CLI > Env > File > Defaults
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub paging: PagingConfig,
}

impl Config {
    /// Load config from default location, falling back to defaults
    pub fn load() -> crate::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> crate::Result<Self> {
        if !path.exists() {
            // No config file? Use defaults
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| crate::Error::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Save config to the default location
    pub fn save(&self) -> crate::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> crate::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| crate::Error::ConfigError(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Where the SQLite cache lives unless the config says otherwise
    pub fn db_path(&self) -> crate::Result<PathBuf> {
        match self.cache.db_path {
            Some(ref path) => Ok(path.clone()),
            None => default_db_path(),
        }
    }

    /// XDG config dir on Unix-like systems, AppData on Windows
    pub fn config_path() -> crate::Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| crate::Error::ConfigError("Could not find config directory".into()))?
            .join("repopager");

        Ok(config_dir.join("config.toml"))
    }
}

fn default_db_path() -> crate::Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| crate::Error::ConfigError("Could not find data directory".into()))?;
    Ok(data_dir.join("repopager").join("github.db"))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// GitHub personal access token
    /// Get one at https://github.com/settings/tokens
    pub token: Option<String>,

    /// API URL (for GitHub Enterprise)
    #[serde(default = "default_github_url")]
    pub api_url: String,
}

fn default_github_url() -> String {
    "https://api.github.com".to_string()
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: default_github_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheConfig {
    /// SQLite file; defaults to the platform data dir
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagingConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// When a cached scope skips the network
    #[serde(default)]
    pub short_circuit: ShortCircuit,

    /// Retries for transient API failures, inside a single page fetch
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_page_size() -> u32 {
    30 // GitHub's own default per_page
}

fn default_max_retries() -> u32 {
    3
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            short_circuit: ShortCircuit::default(),
            max_retries: default_max_retries(),
        }
    }
}
