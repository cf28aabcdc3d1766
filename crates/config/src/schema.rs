use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_base_url() -> String {
    "http://127.0.0.1:4000/api".to_string()
}
fn default_refresh_timeout_secs() -> u64 {
    9
}
fn default_refresh_margin_secs() -> u64 {
    60
}

/// Top-level client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the chatter API (defaults to a local dev server).
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Hard timeout for the token-refresh call, in seconds (defaults to 9).
    #[serde(default = "default_refresh_timeout_secs")]
    pub refresh_timeout_secs: u64,
    /// Safety margin before expiry at which the proactive refresh fires,
    /// in seconds (defaults to 60).
    #[serde(default = "default_refresh_margin_secs")]
    pub refresh_margin_secs: u64,
    /// Credential file path (defaults to `~/.chatter/credentials.json`).
    #[serde(default)]
    pub store_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            refresh_timeout_secs: default_refresh_timeout_secs(),
            refresh_margin_secs: default_refresh_margin_secs(),
            store_path: None,
        }
    }
}

impl Config {
    /// Parses configuration from a YAML string, merged with defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the YAML is invalid or extraction fails.
    #[allow(clippy::result_large_err)]
    pub fn from_yaml(yaml: &str) -> Result<Self, figment::Error> {
        use figment::{
            Figment,
            providers::{Format as _, Serialized, Yaml},
        };
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::string(yaml))
            .extract()
    }

    /// Loads configuration from a file path, merged with defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the file cannot be read or parsed.
    #[allow(clippy::result_large_err)]
    pub fn from_file(path: &std::path::Path) -> Result<Self, figment::Error> {
        use figment::{
            Figment,
            providers::{Format as _, Serialized, Yaml},
        };
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .extract()
    }

    /// Resolved credential file path.
    #[must_use]
    pub fn store_path(&self) -> PathBuf {
        self.store_path.clone().unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".chatter").join("credentials.json")
        })
    }
}
