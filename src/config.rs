use serde::Deserialize;
use std::path::Path;

use crate::source::DetectionMode;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// rss2json-compatible conversion endpoint
    #[serde(default = "default_api_endpoint")]
    pub api_endpoint: String,
    /// Maximum number of cards rendered per feed
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    #[serde(default = "default_placeholder_image")]
    pub placeholder_image: String,
    /// chrono format string used for card dates
    #[serde(default = "default_date_format")]
    pub date_format: String,
    #[serde(default)]
    pub feed_detection: DetectionMode,
    /// Per-request timeout in seconds; unset means wait indefinitely
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default = "default_service_worker")]
    pub service_worker: String,
    /// How long an install click waits for the user's answer
    #[serde(default = "default_install_choice_timeout_secs")]
    pub install_choice_timeout_secs: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_api_endpoint() -> String {
    "https://api.rss2json.com/v1/api.json".to_string()
}

fn default_max_items() -> usize {
    5
}

fn default_placeholder_image() -> String {
    "https://via.placeholder.com/65".to_string()
}

fn default_date_format() -> String {
    "%-m/%-d/%Y".to_string()
}

fn default_service_worker() -> String {
    "static/sw.js".to_string()
}

fn default_install_choice_timeout_secs() -> u64 {
    120
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            api_endpoint: default_api_endpoint(),
            max_items: default_max_items(),
            placeholder_image: default_placeholder_image(),
            date_format: default_date_format(),
            feed_detection: DetectionMode::default(),
            request_timeout_secs: None,
            service_worker: default_service_worker(),
            install_choice_timeout_secs: default_install_choice_timeout_secs(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }
}
