use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs, path::PathBuf};

use crate::service::ServiceId;

/// Configuration for a single upstream service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub api_key: String,

    /// Optional override of the built-in base URL, e.g. a regional
    /// LocationIQ endpoint.
    pub base_url: Option<String>,
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Example TOML:
    /// [services.locationiq]
    /// api_key = "..."
    /// base_url = "https://eu1.locationiq.com"
    pub services: HashMap<String, ServiceConfig>,
}

impl Config {
    pub fn service_config(&self, id: ServiceId) -> Option<&ServiceConfig> {
        self.services.get(id.as_str())
    }

    /// API key for a service: config file first, then the
    /// `SKYCAST_<SERVICE>_API_KEY` environment variable.
    pub fn service_api_key(&self, id: ServiceId) -> Option<String> {
        if let Some(cfg) = self.services.get(id.as_str()) {
            return Some(cfg.api_key.clone());
        }
        std::env::var(id.api_key_env_var()).ok().filter(|key| !key.trim().is_empty())
    }

    /// Base URL for a service, honoring any config override.
    pub fn service_base_url(&self, id: ServiceId) -> String {
        self.service_config(id)
            .and_then(|cfg| cfg.base_url.clone())
            .unwrap_or_else(|| id.default_base_url().to_string())
    }

    pub fn is_service_configured(&self, id: ServiceId) -> bool {
        self.service_api_key(id).is_some()
    }

    /// Set/replace a service API key, keeping any base_url override.
    pub fn upsert_service_api_key(&mut self, id: ServiceId, api_key: String) {
        let base_url = self.services.get(id.as_str()).and_then(|cfg| cfg.base_url.clone());
        self.services.insert(id.as_str().to_string(), ServiceConfig { api_key, base_url });
    }

    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        if !path.exists() {
            // First run: no config file, return empty.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(&path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "skycast", "skycast")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }
}
