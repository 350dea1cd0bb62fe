//! Forum client configuration

use crate::error::{ForumError, Result};
use nostr_client::RelayConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides `relay_url`.
pub const RELAY_ENV_VAR: &str = "NOSTR_FORUM_RELAY";

/// Thread-tag value used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "nostr-forum";

/// Forum client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForumConfig {
    /// Relay to connect to
    pub relay_url: String,
    /// Thread-tag value grouping all forum traffic
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Unset waits for the relay's `OK` indefinitely
    #[serde(default)]
    pub publish_timeout_secs: Option<u64>,
    /// Unset waits for `EOSE` indefinitely
    #[serde(default)]
    pub query_timeout_secs: Option<u64>,
    /// Unset waits for a matching zap receipt indefinitely
    #[serde(default)]
    pub payment_wait_timeout_secs: Option<u64>,
    /// Drop relay events whose id or signature does not verify
    #[serde(default = "default_verify_events")]
    pub verify_events: bool,
    /// Relays named in zap requests; empty means the session relay
    #[serde(default)]
    pub zap_relays: Vec<String>,
    /// Maximum threads fetched by a listing
    #[serde(default = "default_thread_limit")]
    pub thread_limit: u64,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_verify_events() -> bool {
    true
}

fn default_thread_limit() -> u64 {
    50
}

impl Default for ForumConfig {
    fn default() -> Self {
        Self {
            relay_url: "wss://relay.damus.io".to_string(),
            namespace: default_namespace(),
            connect_timeout_secs: default_connect_timeout(),
            publish_timeout_secs: None,
            query_timeout_secs: None,
            payment_wait_timeout_secs: None,
            verify_events: default_verify_events(),
            zap_relays: Vec::new(),
            thread_limit: default_thread_limit(),
        }
    }
}

impl ForumConfig {
    /// Load config from the default path, or defaults if the file is absent.
    /// `NOSTR_FORUM_RELAY` overrides the relay either way.
    pub fn load() -> Result<Self> {
        let config = Self::load_from(&Self::config_path()?)?;
        Ok(config.with_env_overrides())
    }

    /// Load config from `path`, or defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ForumError::Config(format!("reading {}: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| ForumError::Config(format!("parsing {}: {}", path.display(), e)))
    }

    /// Save config to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ForumError::Config(format!("creating {}: {}", parent.display(), e)))?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ForumError::Config(e.to_string()))?;
        std::fs::write(path, content)
            .map_err(|e| ForumError::Config(format!("writing {}: {}", path.display(), e)))
    }

    /// `~/.config/nostr-forum/config.toml` (platform config dir)
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ForumError::Config("could not determine config directory".into()))?;
        Ok(config_dir.join("nostr-forum").join("config.toml"))
    }

    pub fn with_env_overrides(self) -> Self {
        match std::env::var(RELAY_ENV_VAR) {
            Ok(relay) if !relay.trim().is_empty() => self.with_relay(relay.trim()),
            _ => self,
        }
    }

    pub fn with_relay(mut self, relay_url: impl Into<String>) -> Self {
        self.relay_url = relay_url.into();
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn payment_wait_timeout(&self) -> Option<Duration> {
        self.payment_wait_timeout_secs.map(Duration::from_secs)
    }

    /// Relays to list in a zap request: `zap_relays`, else the relay the
    /// session is connected to, else `relay_url`.
    pub fn zap_relays_or(&self, connected: Option<String>) -> Vec<String> {
        if !self.zap_relays.is_empty() {
            return self.zap_relays.clone();
        }
        vec![connected.unwrap_or_else(|| self.relay_url.clone())]
    }

    /// Transport settings derived from this config.
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            publish_timeout: self.publish_timeout_secs.map(Duration::from_secs),
            query_timeout: self.query_timeout_secs.map(Duration::from_secs),
            verify_events: self.verify_events,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ForumConfig::default();
        assert_eq!(config.namespace, "nostr-forum");
        assert_eq!(config.connect_timeout_secs, 10);
        assert!(config.publish_timeout_secs.is_none());
        assert!(config.payment_wait_timeout().is_none());
        assert!(config.verify_events);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: ForumConfig = toml::from_str(
            r#"
relay_url = "ws://127.0.0.1:7000"
publish_timeout_secs = 5
"#,
        )
        .expect("should deserialize");

        assert_eq!(config.relay_url, "ws://127.0.0.1:7000");
        assert_eq!(config.namespace, DEFAULT_NAMESPACE);
        assert_eq!(config.thread_limit, 50);

        let relay = config.relay_config();
        assert_eq!(relay.publish_timeout, Some(Duration::from_secs(5)));
        assert_eq!(relay.query_timeout, None);
        assert_eq!(relay.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_zap_relays_fall_back_to_session_relay() {
        let config = ForumConfig::default().with_relay("wss://forum.example");
        assert_eq!(
            config.zap_relays_or(Some("wss://joined.example/".into())),
            vec!["wss://joined.example/"]
        );
        assert_eq!(config.zap_relays_or(None), vec!["wss://forum.example"]);

        let config = ForumConfig {
            zap_relays: vec!["wss://a".into(), "wss://b".into()],
            ..config
        };
        assert_eq!(config.zap_relays_or(Some("wss://joined.example/".into())).len(), 2);
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let config = ForumConfig::load_from(Path::new("/nonexistent/nostr-forum.toml")).unwrap();
        assert_eq!(config, ForumConfig::default());
    }
}
