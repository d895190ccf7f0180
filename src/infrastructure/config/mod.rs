//! Configuration management

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use crate::application::errors::ConfigError;
use crate::infrastructure::tail::TailConfig;

/// Relay configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub channels: Vec<ChannelConfig>,
    pub presence: PresenceConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerConfig {
    pub address: String,
    #[serde(default = "default_login_timeout")]
    pub login_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

/// One channel and the bot account that serves it
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChannelConfig {
    pub name: String,
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PresenceConfig {
    pub enabled: bool,
    pub log_path: Option<PathBuf>,
    #[serde(default = "default_retry_interval")]
    pub retry_interval_ms: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_login_timeout() -> u64 {
    10
}

fn default_retry_interval() -> u64 {
    500
}

fn default_poll_interval() -> u64 {
    1000
}

impl Default for Config {
    fn default() -> Self {
        let channel = |name: &str, username: &str| ChannelConfig {
            name: name.to_string(),
            username: username.to_string(),
            password: String::new(),
        };

        Self {
            server: ServerConfig {
                address: "127.0.0.1:6112".to_string(),
                login_timeout_secs: default_login_timeout(),
            },
            database: DatabaseConfig {
                path: PathBuf::from("chat-relay.db"),
            },
            channels: vec![
                channel("general", "chat"),
                channel("trade", "trade"),
                channel("hardcore", "hc"),
            ],
            presence: PresenceConfig {
                enabled: false,
                log_path: None,
                retry_interval_ms: default_retry_interval(),
                poll_interval_ms: default_poll_interval(),
            },
        }
    }
}

impl Config {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Parse(format!("Failed to read config: {}", e)))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse config: {}", e)))
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self)
            .map_err(|e| ConfigError::Parse(format!("Failed to serialize config: {}", e)))
    }

    pub fn load_env() -> Self {
        let mut config = Config::default();
        config.apply_env();
        config
    }

    /// Override settings from environment variables
    pub fn apply_env(&mut self) {
        if let Ok(address) = std::env::var("SERVER_ADDRESS") {
            self.server.address = address;
        }

        if let Ok(path) = std::env::var("DATABASE_PATH") {
            self.database.path = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("PRESENCE_LOG") {
            self.presence.log_path = Some(PathBuf::from(path));
            self.presence.enabled = true;
        }

        for channel in &mut self.channels {
            let prefix = channel.name.to_uppercase();
            if let Ok(username) = std::env::var(format!("{}_USERNAME", prefix)) {
                channel.username = username;
            }
            if let Ok(password) = std::env::var(format!("{}_PASSWORD", prefix)) {
                channel.password = password;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.address.trim().is_empty() {
            return Err(ConfigError::MissingField("server.address".to_string()));
        }

        if self.channels.is_empty() {
            return Err(ConfigError::MissingField("channels".to_string()));
        }

        let mut seen = HashSet::new();
        for channel in &self.channels {
            if channel.name.trim().is_empty() {
                return Err(ConfigError::MissingField("channels[].name".to_string()));
            }
            if !seen.insert(channel.name.as_str()) {
                return Err(ConfigError::InvalidValue(format!("duplicate channel: {}", channel.name)));
            }
            if channel.username.trim().is_empty() {
                return Err(ConfigError::MissingField(format!("channels.{}.username", channel.name)));
            }
            if channel.password.is_empty() {
                return Err(ConfigError::MissingField(format!("channels.{}.password", channel.name)));
            }
        }

        if self.presence.enabled && self.presence.log_path.is_none() {
            return Err(ConfigError::MissingField("presence.log-path".to_string()));
        }

        Ok(())
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name.clone()).collect()
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelConfig> {
        self.channels.iter().find(|c| c.name == name)
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.server.login_timeout_secs)
    }

    /// Tail settings, `None` when presence tracking is off
    pub fn tail_config(&self) -> Option<TailConfig> {
        if !self.presence.enabled {
            return None;
        }
        let path = self.presence.log_path.clone()?;
        Some(TailConfig {
            path,
            retry_interval: Duration::from_millis(self.presence.retry_interval_ms),
            poll_interval: Duration::from_millis(self.presence.poll_interval_ms),
        })
    }
}
