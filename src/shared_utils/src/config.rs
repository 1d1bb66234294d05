//! Dashboard configuration: parsing, defaults, environment overrides.
//!
//! The configuration is a single TOML document with three sections:
//!
//! ```toml
//! [chat]
//! endpoint = "http://localhost:8000/chat/stream"
//! inactivity_timeout_secs = 50
//!
//! [resources]
//! base_url = "http://localhost:8000/api"
//!
//! [market_data]
//! base_url = "https://api.twelvedata.com"
//! api_key_env = "MARKET_DATA_API_KEY"
//! requests_per_second = 8
//! lookback_bars = 5000
//! ```
//!
//! Every field has a default, so an empty document is a valid configuration.
//! Entrypoints:
//! - Parse from a string: [`load_config_str`]
//! - Parse from a file path: [`load_config_path`]

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::env::{MissingEnvVarError, env_override};

/// Overrides `chat.endpoint`.
pub const ENV_CHAT_ENDPOINT: &str = "DASHBOARD_CHAT_ENDPOINT";
/// Overrides `resources.base_url`.
pub const ENV_RESOURCES_URL: &str = "DASHBOARD_RESOURCES_URL";
/// Overrides `market_data.base_url`.
pub const ENV_MARKET_DATA_URL: &str = "DASHBOARD_MARKET_DATA_URL";

/// Errors related to application configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable required by the application is not set.
    #[error(transparent)]
    MissingEnvVar(#[from] MissingEnvVarError),

    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The configuration document is not valid TOML for [`DashboardConfig`].
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but is not usable.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DashboardConfig {
    pub chat: ChatConfig,
    pub resources: ResourcesConfig,
    pub market_data: MarketDataConfig,
}

/// The SSE chat endpoint and stream lifecycle knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChatConfig {
    pub endpoint: String,
    /// Seconds without a received chunk before a turn is cancelled.
    pub inactivity_timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8000/chat/stream".to_string(),
            inactivity_timeout_secs: 50,
        }
    }
}

impl ChatConfig {
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }
}

/// Root of the REST resource layer (chats, charts, screeners).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResourcesConfig {
    pub base_url: String,
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
        }
    }
}

/// Upstream market-data API used by the chart datafeed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MarketDataConfig {
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub requests_per_second: u32,
    /// Number of bars requested per backfill window.
    pub lookback_bars: u32,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.twelvedata.com".to_string(),
            api_key_env: "MARKET_DATA_API_KEY".to_string(),
            requests_per_second: 8,
            lookback_bars: 5000,
        }
    }
}

impl DashboardConfig {
    /// Replaces URLs with the values of `DASHBOARD_*` environment variables when set.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_override(ENV_CHAT_ENDPOINT) {
            self.chat.endpoint = v;
        }
        if let Some(v) = env_override(ENV_RESOURCES_URL) {
            self.resources.base_url = v;
        }
        if let Some(v) = env_override(ENV_MARKET_DATA_URL) {
            self.market_data.base_url = v;
        }
    }

    /// Rejects values that parse but cannot drive the application.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let urls = [
            ("chat.endpoint", &self.chat.endpoint),
            ("resources.base_url", &self.resources.base_url),
            ("market_data.base_url", &self.market_data.base_url),
        ];
        for (field, url) in urls {
            if url.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{field} must not be empty")));
            }
        }
        if self.chat.inactivity_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "chat.inactivity_timeout_secs must be > 0".into(),
            ));
        }
        if self.market_data.requests_per_second == 0 {
            return Err(ConfigError::Invalid(
                "market_data.requests_per_second must be > 0".into(),
            ));
        }
        if self.market_data.lookback_bars == 0 {
            return Err(ConfigError::Invalid(
                "market_data.lookback_bars must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Parse a configuration from a TOML string, apply env overrides and validate it.
pub fn load_config_str(toml_str: &str) -> Result<DashboardConfig, ConfigError> {
    let mut cfg: DashboardConfig = toml::from_str(toml_str)?;
    cfg.apply_env_overrides();
    cfg.validate()?;
    Ok(cfg)
}

/// Read a configuration file from disk; see [`load_config_str`].
pub fn load_config_path(path: impl AsRef<std::path::Path>) -> Result<DashboardConfig, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    load_config_str(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn clear_overrides() {
        // SAFETY: every test in this module that touches the env is #[serial].
        unsafe {
            std::env::remove_var(ENV_CHAT_ENDPOINT);
            std::env::remove_var(ENV_RESOURCES_URL);
            std::env::remove_var(ENV_MARKET_DATA_URL);
        }
    }

    #[test]
    #[serial]
    fn empty_document_uses_defaults() {
        clear_overrides();
        let cfg = load_config_str("").unwrap();
        assert_eq!(cfg, DashboardConfig::default());
        assert_eq!(cfg.chat.inactivity_timeout(), Duration::from_secs(50));
        assert_eq!(cfg.market_data.lookback_bars, 5000);
    }

    #[test]
    #[serial]
    fn partial_sections_keep_other_defaults() {
        clear_overrides();
        let cfg = load_config_str(
            r#"
            [chat]
            inactivity_timeout_secs = 10
            [market_data]
            requests_per_second = 2
            "#,
        )
        .unwrap();
        assert_eq!(cfg.chat.inactivity_timeout_secs, 10);
        assert_eq!(cfg.chat.endpoint, ChatConfig::default().endpoint);
        assert_eq!(cfg.market_data.requests_per_second, 2);
        assert_eq!(cfg.market_data.api_key_env, "MARKET_DATA_API_KEY");
    }

    #[test]
    #[serial]
    fn unknown_fields_are_rejected() {
        clear_overrides();
        let err = load_config_str("[chat]\ntimeout = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    #[serial]
    fn zero_timeout_is_invalid() {
        clear_overrides();
        let err = load_config_str("[chat]\ninactivity_timeout_secs = 0\n").unwrap_err();
        assert!(err.to_string().contains("inactivity_timeout_secs"));
    }

    #[test]
    #[serial]
    fn env_overrides_win_over_file() {
        clear_overrides();
        unsafe { std::env::set_var(ENV_RESOURCES_URL, "http://example.test/api") };
        let cfg = load_config_str("[resources]\nbase_url = \"http://file/api\"\n").unwrap();
        assert_eq!(cfg.resources.base_url, "http://example.test/api");
        clear_overrides();
    }

    #[test]
    #[serial]
    fn loads_from_path_and_reports_missing_file() {
        clear_overrides();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[chat]\nendpoint = \"http://chat.test/stream\"").unwrap();
        let cfg = load_config_path(file.path()).unwrap();
        assert_eq!(cfg.chat.endpoint, "http://chat.test/stream");

        let dir = tempfile::tempdir().unwrap();
        let err = load_config_path(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
