//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the API base URL, refresh timing, where tokens are kept,
//! and the last used username.
//!
//! Configuration is stored at `~/.config/storefront/config.json`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::{ApiClient, DEFAULT_REQUEST_TIMEOUT_SECS};
use crate::auth::{
    FileTokenStore, KeyringTokenStore, MemoryTokenStore, SessionConfig, TokenStore,
    AUTH_TOKENS_KEY, DEFAULT_REFRESH_INTERVAL_SECS,
};

/// Application name used for config/data directory paths
const APP_NAME: &str = "storefront";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable that overrides `api_base_url`
pub const API_URL_ENV: &str = "STOREFRONT_API_URL";

const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";

/// Where the token pair is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Keyring,
    /// Nothing is persisted; the session ends with the process
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub refresh_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub storage: StorageBackend,
    pub last_username: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            storage: StorageBackend::default(),
            last_username: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory the file token store writes into
    pub fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Apply `STOREFRONT_API_URL` if it is set
    pub fn apply_env(&mut self) {
        self.override_api_url(std::env::var(API_URL_ENV).ok());
    }

    fn override_api_url(&mut self, url: Option<String>) {
        if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url;
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            refresh_interval: self.refresh_interval(),
            storage_key: AUTH_TOKENS_KEY.to_string(),
        }
    }

    pub fn api_client(&self) -> Result<ApiClient> {
        ApiClient::new(self.api_base_url.clone(), self.request_timeout())
            .context("Failed to build HTTP client")
    }

    pub fn token_store(&self) -> Result<Arc<dyn TokenStore>> {
        Ok(match self.storage {
            StorageBackend::File => Arc::new(FileTokenStore::new(Self::data_dir()?)),
            StorageBackend::Keyring => Arc::new(KeyringTokenStore::new()),
            StorageBackend::Memory => Arc::new(MemoryTokenStore::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.refresh_interval(), Duration::from_secs(540));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.storage, StorageBackend::File);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"storage": "keyring", "last_username": "ada"}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.storage, StorageBackend::Keyring);
        assert_eq!(config.last_username.as_deref(), Some("ada"));
        assert_eq!(config.refresh_interval_secs, DEFAULT_REFRESH_INTERVAL_SECS);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            api_base_url: "https://shop.example.com/api".to_string(),
            refresh_interval_secs: 120,
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.api_base_url, "https://shop.example.com/api");
        assert_eq!(loaded.session_config().refresh_interval, Duration::from_secs(120));
        assert_eq!(loaded.session_config().storage_key, "authTokens");
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_api_url_override() {
        let mut config = Config::default();
        config.override_api_url(None);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        config.override_api_url(Some("  ".to_string()));
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        config.override_api_url(Some("https://api.example.com".to_string()));
        assert_eq!(config.api_base_url, "https://api.example.com");
    }
}
