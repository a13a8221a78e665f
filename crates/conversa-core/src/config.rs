use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Result, anyhow};

use crate::ai::openai::{DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_TIMEOUT_SECS};
use crate::ai::CompletionConfig;

/// Environment variable that overrides the stored API key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

const APP_DIR: &str = "conversa";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub model: String,
    /// Where the conversation and settings are stored; platform data dir if unset.
    pub data_dir: Option<PathBuf>,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            data_dir: None,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(config_path, config_content)?;
        Ok(())
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow!("Could not determine data directory"))?;
        Ok(data_dir.join(APP_DIR))
    }

    /// Completion settings for `api_key`, with `OPENAI_API_KEY` taking precedence.
    pub fn completion(&self, api_key: Option<&str>) -> CompletionConfig {
        self.completion_with(std::env::var(API_KEY_ENV).ok().as_deref(), api_key)
    }

    fn completion_with(&self, env_key: Option<&str>, api_key: Option<&str>) -> CompletionConfig {
        let key = env_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .or_else(|| api_key.map(str::trim))
            .unwrap_or_default();

        CompletionConfig::new(key)
            .with_base_url(&self.base_url)
            .with_model(&self.model)
            .with_timeout(Duration::from_secs(self.request_timeout_secs))
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join(APP_DIR).join("config.json"))
    }
}
