//! Configuration for gridmap front ends.
//!
//! The [`GridmapConfig`] is stored in `~/.gridmap/config.toml` and supports
//! partial configs where unspecified values use defaults. The backend URL and
//! access token can be overridden with the `GRIDMAP_API_URL` and
//! `GRIDMAP_API_TOKEN` environment variables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable overriding [`ApiConfig::base_url`].
pub const API_URL_ENV: &str = "GRIDMAP_API_URL";

/// Environment variable overriding [`ApiConfig::token`].
pub const API_TOKEN_ENV: &str = "GRIDMAP_API_TOKEN";

/// Main configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridmapConfig {
    /// Backend connection settings.
    pub api: ApiConfig,

    /// Selection and scenario staging settings.
    pub session: SessionConfig,

    /// Progress event stream settings.
    pub feed: FeedConfig,
}

/// Backend connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the REST API (without the `/api` prefix).
    pub base_url: String,

    /// OIDC access token sent as a bearer token with every request.
    pub token: Option<String>,

    /// Event stream URL. Derived from `base_url` when unset.
    pub events_url: Option<String>,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Page size for connection request queries.
    pub request_limit: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            token: None,
            events_url: None,
            timeout_secs: 30,
            request_limit: 1000,
        }
    }
}

impl ApiConfig {
    /// The event stream URL, `ws(s)://host/api/ws/events` unless configured.
    pub fn events_url(&self) -> String {
        if let Some(url) = &self.events_url {
            return url.clone();
        }

        let base = self.base_url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!("{base}/api/ws/events")
    }
}

/// Selection and scenario staging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Network selected on startup.
    pub default_network_id: Option<String>,

    /// Shortest accepted scenario name (after trimming).
    pub min_scenario_name_len: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_network_id: None,
            min_scenario_name_len: crate::session::MIN_SCENARIO_NAME_LEN,
        }
    }
}

/// Progress event stream settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Delay before reconnecting a dropped stream.
    pub reconnect_delay_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: 500,
        }
    }
}

impl GridmapConfig {
    /// Get the default config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".gridmap"))
    }

    /// Get the default config file path.
    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|d| d.join("config.toml"))
    }

    /// Load configuration from the default location, then apply environment
    /// overrides.
    ///
    /// Returns the default config if the file doesn't exist.
    pub fn load() -> Result<Self> {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path)?,
            _ => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()
            .ok_or_else(|| Error::Config("could not determine config directory".to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        self.save_to(&path)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(url) = non_empty_env(API_URL_ENV) {
            self.api.base_url = url;
        }
        if let Some(token) = non_empty_env(API_TOKEN_ENV) {
            self.api.token = Some(token);
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = GridmapConfig::default();
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.session.min_scenario_name_len, 3);
        assert_eq!(config.feed.reconnect_delay_ms, 500);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = GridmapConfig::default();
        config.api.base_url = "https://grid.example.org".to_string();
        config.api.token = Some("secret".to_string());
        config.session.default_network_id = Some("net-1".to_string());
        config.save_to(&path).unwrap();

        let loaded = GridmapConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        std::fs::write(
            &path,
            r#"
[feed]
reconnect_delay_ms = 2000
"#,
        )
        .unwrap();

        let config = GridmapConfig::load_from(&path).unwrap();
        assert_eq!(config.feed.reconnect_delay_ms, 2000);
        assert_eq!(config.api.base_url, "http://localhost:8000");
        assert_eq!(config.session.min_scenario_name_len, 3);
    }

    #[test]
    fn test_events_url_derivation() {
        let mut api = ApiConfig {
            base_url: "https://grid.example.org/".to_string(),
            ..Default::default()
        };
        assert_eq!(api.events_url(), "wss://grid.example.org/api/ws/events");

        api.base_url = "http://localhost:8000".to_string();
        assert_eq!(api.events_url(), "ws://localhost:8000/api/ws/events");

        api.events_url = Some("ws://feed:9000/events".to_string());
        assert_eq!(api.events_url(), "ws://feed:9000/events");
    }

    #[test]
    fn test_token_env_override() {
        let mut config = GridmapConfig::default();
        std::env::set_var(API_TOKEN_ENV, "from-env");
        config.apply_env_overrides();
        std::env::remove_var(API_TOKEN_ENV);
        assert_eq!(config.api.token.as_deref(), Some("from-env"));
    }

    #[test]
    fn test_invalid_toml_is_serialization_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[api\nbase_url = 1").unwrap();

        assert!(matches!(
            GridmapConfig::load_from(&path),
            Err(Error::Serialization(_))
        ));
    }
}
