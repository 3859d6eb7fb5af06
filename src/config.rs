use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid backend base url {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("relay interval must be greater than zero")]
    InvalidInterval,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_timeout_secs() -> u64 {
    600
}

fn default_relay_port() -> u16 {
    5000
}

fn default_interval_ms() -> u64 {
    3000
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Uploads block until the backend finishes processing the whole video.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    #[default]
    Demo,
    Analytics,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_relay_port")]
    pub port: u16,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default)]
    pub feed: FeedKind,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: default_relay_port(),
            interval_ms: default_interval_ms(),
            feed: FeedKind::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

impl Config {
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Like [`Config::load_from`], but a missing file yields the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "config file not found, using defaults");
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: String) -> Result<Self, ConfigError> {
        self.backend.base_url = base_url;
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let url = reqwest::Url::parse(&self.backend.base_url).map_err(|e| {
            ConfigError::InvalidBaseUrl {
                url: self.backend.base_url.clone(),
                reason: e.to_string(),
            }
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidBaseUrl {
                url: self.backend.base_url.clone(),
                reason: format!("unsupported scheme {}", url.scheme()),
            });
        }

        if self.relay.interval_ms == 0 {
            return Err(ConfigError::InvalidInterval);
        }

        Ok(())
    }
}
