use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::error::{Error, Result};

/// Default per-request timeout for embedding and store RPCs.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub ollama_url: Option<String>,
    /// Directory holding collections, snapshots and the status registry.
    #[serde(default)]
    pub store_dir: Option<PathBuf>,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            base_url: None,
            provider: default_provider(),
            ollama_url: None,
            store_dir: None,
            request_timeout_secs: default_timeout_secs(),
        }
    }
}

impl Config {
    pub fn config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("could not find home directory".to_string()))?;
        let config_dir = home.join(".codeseek");
        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)?;
        }
        Ok(config_dir)
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let content = fs::read_to_string(&path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Directory for collections, snapshots and the registry file.
    pub fn store_dir(&self) -> Result<PathBuf> {
        let dir = match &self.store_dir {
            Some(dir) => dir.clone(),
            None => Self::config_dir()?.join("store"),
        };
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        Ok(dir)
    }

    pub fn get_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
    }

    pub fn get_base_url(&self) -> String {
        self.base_url
            .clone()
            .or_else(|| std::env::var("CODESEEK_ENDPOINT").ok())
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
    }

    pub fn get_ollama_url(&self) -> String {
        self.ollama_url
            .clone()
            .or_else(|| std::env::var("CODESEEK_ENDPOINT").ok())
            .unwrap_or_else(|| "http://localhost:11434".to_string())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.provider, "openai");
        assert_eq!(config.request_timeout_secs, 30);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn round_trips_through_json() {
        let config = Config {
            provider: "ollama".to_string(),
            model: "nomic-embed-text".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.provider, "ollama");
        assert_eq!(back.model, "nomic-embed-text");
    }
}
