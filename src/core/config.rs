//! Application configuration management
//!
//! This module handles loading and validating configuration from TOML files.
//! All configuration is validated at startup so a bad file fails fast.

use crate::core::backend::BackendType;
use crate::core::backends::openai::OpenAISettings;
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default request timeout in seconds
const DEFAULT_REQUEST_TIMEOUT: u64 = 90;

/// Default server port
const DEFAULT_PORT: u16 = 8000;

/// Default pause between mock backend events
const DEFAULT_MOCK_DELAY_MS: u64 = 20;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIConfig {
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub azure_api_version: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MockConfig {
    #[serde(default = "default_mock_delay_ms")]
    pub delay_ms: u64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            delay_ms: DEFAULT_MOCK_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestConfig {
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT
}

fn default_mock_delay_ms() -> u64 {
    DEFAULT_MOCK_DELAY_MS
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    pub backend: String,
    #[serde(default)]
    pub client_api_key: Option<String>,
    #[serde(default)]
    pub openai: Option<OpenAIConfig>,
    #[serde(default)]
    pub mock: MockConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub request: RequestConfig,
}

/// Application configuration loaded from TOML files
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend type (OpenAI or Mock)
    pub backend: BackendType,

    /// Optional API key clients must present on chat routes
    pub client_api_key: Option<String>,

    /// OpenAI settings (present for the OpenAI backend)
    pub openai: Option<OpenAISettings>,

    /// Pause between mock backend events
    pub mock_delay: Duration,

    /// Server host address
    pub host: String,

    /// Server port
    pub port: u16,

    /// Logging level
    pub log_level: String,

    /// Request timeout in seconds
    pub request_timeout: u64,
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The TOML file cannot be read or parsed
    /// - The backend name is unknown
    /// - The selected backend's section is missing
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read configuration file")?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig =
            toml::from_str(content).context("Failed to parse TOML configuration")?;

        let backend = BackendType::from_str(&config.backend)
            .context("Invalid backend value. Must be one of: openai, mock")?;

        let openai = match (backend, config.openai) {
            (BackendType::OpenAI, None) => {
                bail!("OpenAI configuration missing for OpenAI backend")
            }
            (_, Some(openai_config)) => Some(OpenAISettings {
                api_key: openai_config.api_key,
                base_url: openai_config
                    .base_url
                    .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string())
                    .trim_end_matches('/')
                    .to_string(),
                api_version: openai_config.azure_api_version,
                model: openai_config
                    .model
                    .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
                temperature: openai_config.temperature,
                timeout: config.request.request_timeout,
            }),
            (BackendType::Mock, None) => None,
        };

        Ok(Config {
            backend,
            client_api_key: config.client_api_key.filter(|key| !key.is_empty()),
            openai,
            mock_delay: Duration::from_millis(config.mock.delay_ms),
            host: config.server.host,
            port: config.server.port,
            log_level: config.server.log_level,
            request_timeout: config.request.request_timeout,
        })
    }

    /// Load configuration from environment and config file
    ///
    /// Reads `CONFIG_PATH`, defaulting to config.toml in the current directory
    pub fn from_env() -> Result<Self> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        Self::from_file(config_path)
    }

    /// Validate backend credentials
    ///
    /// OpenAI keys must start with `sk-`; Azure keys only need to be non-empty.
    pub fn validate_backend(&self) -> bool {
        match self.backend {
            BackendType::OpenAI => match &self.openai {
                Some(openai) if openai.api_version.is_some() => !openai.api_key.is_empty(),
                Some(openai) => openai.api_key.starts_with("sk-"),
                None => false,
            },
            BackendType::Mock => true,
        }
    }

    /// Validate a client's API key
    ///
    /// Always passes when no client key is configured.
    pub fn validate_client_api_key(&self, client_api_key: &str) -> bool {
        match &self.client_api_key {
            Some(expected_key) => client_api_key == expected_key,
            None => true,
        }
    }
}
