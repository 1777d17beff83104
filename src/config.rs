//! Configuration loading and management for callsight.
//!
//! Loads settings from `callsight.toml` with environment variable overrides for
//! credentials and deployment-specific values.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::prompt::DEFAULT_PERSONA;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("missing required API key for provider: {0}")]
    MissingApiKey(String),
    #[error("unknown LLM provider: {0}")]
    UnknownProvider(String),
    #[error("missing storage path: set [storage].path or CALLSIGHT_DB_PATH")]
    MissingStoragePath,
    #[error("agent.timeout_secs must be greater than zero")]
    ZeroTimeout,
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// LLM provider: "gemini" or "openai"
    pub provider: String,
    /// Model identifier (e.g., "gemini-2.5-flash")
    pub model: String,
    /// Base URL for the openai provider
    pub endpoint: String,
    /// System persona placed at the top of the prompt
    pub persona: String,
    /// Upper bound on one model call, retries included
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-2.5-flash".to_string(),
            endpoint: "https://api.openai.com/v1".to_string(),
            persona: DEFAULT_PERSONA.to_string(),
            timeout_secs: 60,
            max_attempts: 3,
            retry_base_delay_ms: 500,
        }
    }
}

impl AgentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// API keys configuration (loaded from environment)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApiConfig {
    #[serde(default)]
    pub gemini_key: Option<String>,
    #[serde(default)]
    pub openai_key: Option<String>,
}

/// Storage paths configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// Directory holding the record store and search index
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DiagnosticsConfig {
    /// Log raw model output when it fails to validate. Transcripts may carry
    /// personal and financial details, so this stays off unless asked for.
    #[serde(default)]
    pub log_raw_output: bool,
}

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

impl Config {
    /// Load configuration from the default location (callsight.toml in cwd or home).
    ///
    /// A missing file is not an error; defaults and the environment apply.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::find_config_file() {
            Some(path) => Self::parse_file(&path)?,
            None => Config::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::parse_file(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn parse_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Override values from environment variables
    pub fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = var("GEMINI_API_KEY") {
            self.api.gemini_key = Some(key);
        }
        if let Some(key) = var("OPENAI_API_KEY") {
            self.api.openai_key = Some(key);
        }
        if let Some(path) = var("CALLSIGHT_DB_PATH") {
            self.storage.path = Some(PathBuf::from(path));
        }
        if let Some(model) = var("CALLSIGHT_MODEL") {
            self.agent.model = model;
        }
        if let Some(flag) = var("CALLSIGHT_LOG_RAW_OUTPUT") {
            self.diagnostics.log_raw_output = matches!(flag.as_str(), "1" | "true" | "yes");
        }
    }

    /// Find the config file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        // Check current directory first
        let local_config = PathBuf::from("callsight.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        // Check home directory
        let home_config = dirs::home_dir()?
            .join(".config")
            .join("callsight")
            .join("callsight.toml");
        home_config.exists().then_some(home_config)
    }

    /// Both credentials must be present before the process accepts work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.api_key()?;
        self.storage_path()?;
        if self.agent.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    /// Get the API key for the configured provider
    pub fn api_key(&self) -> Result<&str, ConfigError> {
        let key = match self.agent.provider.as_str() {
            "gemini" => self.api.gemini_key.as_deref(),
            "openai" => self.api.openai_key.as_deref(),
            other => return Err(ConfigError::UnknownProvider(other.to_string())),
        };
        key.filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingApiKey(self.agent.provider.clone()))
    }

    pub fn storage_path(&self) -> Result<&Path, ConfigError> {
        self.storage
            .path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or(ConfigError::MissingStoragePath)
    }

    /// Location of the full-text index, next to the record store.
    pub fn search_index_path(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.storage_path()?.join("search_index"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn parses_partial_file_with_defaults() {
        let config: Config = toml::from_str(
            r#"
            [agent]
            provider = "openai"
            model = "gpt-4o-mini"

            [storage]
            path = "/var/lib/callsight"
            "#,
        )
        .unwrap();

        assert_eq!(config.agent.provider, "openai");
        assert_eq!(config.agent.timeout_secs, 60);
        assert_eq!(config.agent.max_attempts, 3);
        assert!(!config.diagnostics.log_raw_output);
        assert_eq!(config.storage_path().unwrap(), Path::new("/var/lib/callsight"));
    }

    #[test]
    fn refuses_to_start_without_credentials() {
        let mut config = Config::default();
        assert!(matches!(config.validate(), Err(ConfigError::MissingApiKey(p)) if p == "gemini"));

        config.apply_env(env(&[("GEMINI_API_KEY", "k")]));
        assert!(matches!(config.validate(), Err(ConfigError::MissingStoragePath)));

        config.apply_env(env(&[("CALLSIGHT_DB_PATH", "/tmp/db")]));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut config = Config::default();
        config.apply_env(env(&[("GEMINI_API_KEY", "k"), ("CALLSIGHT_DB_PATH", "/tmp/db")]));
        config.agent.timeout_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroTimeout)));

        config.agent.timeout_secs = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        let mut config = Config::default();
        config.apply_env(env(&[("GEMINI_API_KEY", "  "), ("CALLSIGHT_DB_PATH", "/tmp/db")]));
        assert!(matches!(config.validate(), Err(ConfigError::MissingApiKey(_))));
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let mut config = Config::default();
        config.agent.provider = "mystery".to_string();
        assert!(matches!(config.api_key(), Err(ConfigError::UnknownProvider(p)) if p == "mystery"));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = Config::default();
        config.apply_env(env(&[
            ("CALLSIGHT_MODEL", "gemini-2.5-pro"),
            ("CALLSIGHT_LOG_RAW_OUTPUT", "true"),
        ]));
        assert_eq!(config.agent.model, "gemini-2.5-pro");
        assert!(config.diagnostics.log_raw_output);
    }
}
