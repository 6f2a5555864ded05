//! Sidecar configuration
//!
//! Defaults, then the JSON config file, then `ASK_AI_*` environment overrides.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::chat::panel::PanelOptions;
use crate::chat::relay::{RelayMode, DEFAULT_STREAM_IDLE_TIMEOUT};
use crate::chat::turn::BusyPolicy;
use crate::llm_engine::OllamaConfig;

/// Points at an explicit config file
pub const CONFIG_PATH_ENV: &str = "ASK_AI_CONFIG";
pub const BASE_URL_ENV: &str = "ASK_AI_BASE_URL";
pub const MODEL_ENV: &str = "ASK_AI_MODEL";
pub const MODE_ENV: &str = "ASK_AI_MODE";
pub const BUSY_POLICY_ENV: &str = "ASK_AI_BUSY_POLICY";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid value for {key}: {message}")]
    Env { key: &'static str, message: String },
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AskAiConfig {
    pub base_url: String,
    pub model: String,
    pub mode: RelayMode,
    pub busy_policy: BusyPolicy,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// Longest silence tolerated between streamed chunks
    pub stream_idle_timeout_secs: u64,
}

impl Default for AskAiConfig {
    fn default() -> Self {
        let ollama = OllamaConfig::default();
        Self {
            base_url: ollama.base_url,
            model: "llama2".to_string(),
            mode: RelayMode::default(),
            busy_policy: BusyPolicy::default(),
            connect_timeout_secs: ollama.connect_timeout_secs,
            request_timeout_secs: ollama.request_timeout_secs,
            stream_idle_timeout_secs: DEFAULT_STREAM_IDLE_TIMEOUT.as_secs(),
        }
    }
}

/// `$ASK_AI_CONFIG`, or `<config dir>/ask-ai/config.json`
pub fn config_path() -> Option<PathBuf> {
    if let Ok(path) = env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    dirs::config_dir().map(|dir| dir.join("ask-ai").join("config.json"))
}

impl AskAiConfig {
    /// Load, override from the environment, and validate
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match config_path() {
            Some(path) => Self::load_from(&path)?,
            None => {
                log::warn!("Could not determine config directory, using defaults");
                Self::default()
            }
        };

        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Read a config file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config = serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Apply `ASK_AI_*` overrides using `lookup` to read variables
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(BASE_URL_ENV) {
            self.base_url = url;
        }
        if let Some(model) = lookup(MODEL_ENV) {
            self.model = model;
        }
        if let Some(mode) = lookup(MODE_ENV) {
            self.mode = mode.parse().map_err(|message| ConfigError::Env {
                key: MODE_ENV,
                message,
            })?;
        }
        if let Some(policy) = lookup(BUSY_POLICY_ENV) {
            self.busy_policy = policy.parse().map_err(|message| ConfigError::Env {
                key: BUSY_POLICY_ENV,
                message,
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.base_url.trim();
        if url.is_empty() {
            return Err(ConfigError::Invalid("base_url is required".to_string()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "base_url must start with http:// or https:// (got '{}')",
                url
            )));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid("model is required".to_string()));
        }

        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "connect_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.stream_idle_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "stream_idle_timeout_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn ollama_config(&self) -> OllamaConfig {
        OllamaConfig {
            base_url: self.base_url.trim().to_string(),
            connect_timeout_secs: self.connect_timeout_secs,
            request_timeout_secs: self.request_timeout_secs,
        }
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_idle_timeout_secs)
    }

    pub fn panel_options(&self) -> PanelOptions {
        PanelOptions {
            mode: self.mode,
            busy_policy: self.busy_policy,
        }
    }
}
