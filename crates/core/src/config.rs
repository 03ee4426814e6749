//! Server configuration, loaded from environment variables.
//!
//! Required for live use: a capability-provider API key and project id
//! (browser sessions) and a collaboration-provider token (docs tools).
//! The optional entries are only fallback argument values.

use serde::{Deserialize, Serialize};

const DEFAULT_CONNECT_URL: &str = "wss://connect.webgate.dev";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Access key for the remote browser provider.
    #[serde(default)]
    pub browser_api_key: String,
    /// Project identifier for the remote browser provider.
    #[serde(default)]
    pub browser_project_id: String,
    /// WebSocket endpoint of the browser provider.
    #[serde(default = "default_connect_url")]
    pub browser_connect_url: String,
    /// Access token for the collaboration provider.
    #[serde(default)]
    pub docs_token: String,
    /// Fallback page URL for docs tools when no pageUrl argument is given.
    #[serde(default)]
    pub default_page_url: Option<String>,
    /// Fallback container id for docs_create_record.
    #[serde(default)]
    pub default_database_id: Option<String>,
}

fn default_connect_url() -> String {
    DEFAULT_CONNECT_URL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browser_api_key: String::new(),
            browser_project_id: String::new(),
            browser_connect_url: default_connect_url(),
            docs_token: String::new(),
            default_page_url: None,
            default_database_id: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables. Missing keys fall back
    /// to defaults; tools that need a credential fail per call instead.
    pub fn from_env() -> Self {
        Self {
            browser_api_key: env_or_default("WEBGATE_BROWSER_API_KEY"),
            browser_project_id: env_or_default("WEBGATE_BROWSER_PROJECT_ID"),
            browser_connect_url: std::env::var("WEBGATE_BROWSER_CONNECT_URL")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(default_connect_url),
            docs_token: env_or_default("WEBGATE_DOCS_TOKEN"),
            default_page_url: std::env::var("WEBGATE_DEFAULT_PAGE_URL")
                .ok()
                .filter(|v| !v.is_empty()),
            default_database_id: std::env::var("WEBGATE_DEFAULT_DATABASE_ID")
                .ok()
                .filter(|v| !v.is_empty()),
        }
    }

    /// Full connect string for the browser provider, key and project
    /// carried as query parameters.
    pub fn browser_connect_string(&self) -> String {
        format!(
            "{}?apiKey={}&projectId={}",
            self.browser_connect_url, self.browser_api_key, self.browser_project_id
        )
    }
}

fn env_or_default(key: &str) -> String {
    std::env::var(key).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_connect_url() {
        let cfg = Config::default();
        assert_eq!(cfg.browser_connect_url, DEFAULT_CONNECT_URL);
        assert!(cfg.browser_api_key.is_empty());
        assert!(cfg.default_page_url.is_none());
    }

    #[test]
    fn connect_string_carries_key_and_project() {
        let cfg = Config {
            browser_api_key: "key123".into(),
            browser_project_id: "proj456".into(),
            ..Config::default()
        };
        let url = cfg.browser_connect_string();
        assert!(url.starts_with("wss://"));
        assert!(url.contains("apiKey=key123"));
        assert!(url.contains("projectId=proj456"));
    }

    #[test]
    fn config_round_trips_through_json() {
        let cfg = Config {
            browser_api_key: "k".into(),
            default_page_url: Some("https://example.com".into()),
            ..Config::default()
        };
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("browserApiKey"));
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.default_page_url.as_deref(), Some("https://example.com"));
    }
}
