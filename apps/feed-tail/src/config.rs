//! Tail configuration.
//!
//! Read from `~/.config/feedwire/config.json` unless a path is given on
//! the command line. Every field is optional. `FEEDWIRE_TOKEN`, when set,
//! replaces the configured token.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use feedwire_protocol::constants::{
    DEFAULT_FEED_URL, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_HEARTBEAT_TIMEOUT, MAX_MESSAGE_SIZE,
};
use feedwire_session::{HeartbeatConfig, ReconnectConfig, SessionConfig, WsTransportConfig};

const TOKEN_ENV: &str = "FEEDWIRE_TOKEN";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TailConfig {
    /// Feed endpoint.
    pub url: String,
    /// Topics to listen to.
    pub topics: Vec<String>,
    /// Credential for every topic: `null` for none, or a token string.
    pub token: serde_json::Value,
    pub heartbeat_interval_secs: u64,
    pub heartbeat_timeout_secs: u64,
    pub reconnect_initial_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
}

impl Default for TailConfig {
    fn default() -> Self {
        let reconnect = ReconnectConfig::default();
        Self {
            url: DEFAULT_FEED_URL.into(),
            topics: Vec::new(),
            token: serde_json::Value::Null,
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL.as_secs(),
            heartbeat_timeout_secs: DEFAULT_HEARTBEAT_TIMEOUT.as_secs(),
            reconnect_initial_delay_ms: reconnect.initial_delay.as_millis() as u64,
            reconnect_max_delay_ms: reconnect.max_delay.as_millis() as u64,
        }
    }
}

impl TailConfig {
    /// Loads the configuration from `path`, or from the default location.
    pub fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let path = match path {
            Some(path) => path,
            None => default_config_path()?,
        };
        let mut config = Self::load_from(&path)?;
        if let Ok(token) = std::env::var(TOKEN_ENV)
            && !token.is_empty()
        {
            config.token = serde_json::Value::String(token);
        }
        Ok(config)
    }

    fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse(&content).unwrap_or_else(|| {
            tracing::warn!(
                path = %path.display(),
                "failed to parse config, using defaults"
            );
            Self::default()
        }))
    }

    fn parse(content: &str) -> Option<Self> {
        serde_json::from_str(content).ok()
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            heartbeat: HeartbeatConfig {
                interval: Duration::from_secs(self.heartbeat_interval_secs.max(1)),
                timeout: Duration::from_secs(self.heartbeat_timeout_secs.max(1)),
            },
        }
    }

    pub fn transport_config(&self) -> WsTransportConfig {
        WsTransportConfig {
            url: self.url.clone(),
            reconnect: ReconnectConfig {
                initial_delay: Duration::from_millis(self.reconnect_initial_delay_ms),
                max_delay: Duration::from_millis(self.reconnect_max_delay_ms),
                ..ReconnectConfig::default()
            },
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }
}

fn default_config_path() -> anyhow::Result<PathBuf> {
    Ok(config_base_dir()?.join("feedwire").join("config.json"))
}

fn config_base_dir() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata))
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home).join(".config"))
    }
}
