// Session configuration.
//
// `SessionConfig` collects everything the `partysync` binary needs to start
// a session: the mode, where to listen or connect, the participant tag a
// client asks for, and the tick loop's pacing. It loads from JSON; every
// field is optional in the file and falls back to `Default`. Command-line
// flags in `main.rs` are applied on top of whatever the file said.
//
// `open_network` turns a validated config into the `Network` the
// orchestrator runs on.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;
use partysync_net::{ClientConfig, NetClient, NetError, ServerConfig, start_server};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::game::{Network, SessionMode};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub mode: SessionMode,
    /// Address to bind (server) or connect to (client).
    pub host: String,
    pub port: u16,
    /// Tag a client asks for. Empty lets the server pick one.
    pub client_tag: String,
    /// Module a server or solo session loads at startup.
    pub start_module: Option<String>,
    /// Capacity of the network event channel.
    pub event_capacity: usize,
    /// Consecutive undecodable frames tolerated before a connection closes.
    pub max_decode_failures: u32,
    /// Simulation tick length in milliseconds.
    pub tick_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: SessionMode::Solo,
            host: "127.0.0.1".into(),
            port: 7878,
            client_tag: String::new(),
            start_module: None,
            event_capacity: 1024,
            max_decode_failures: 3,
            tick_ms: 50,
        }
    }
}

impl SessionConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: SessionConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_ms == 0 {
            return Err(ConfigError::Invalid("tick_ms must be positive".into()));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid("event_capacity must be positive".into()));
        }
        if self.max_decode_failures == 0 {
            return Err(ConfigError::Invalid("max_decode_failures must be positive".into()));
        }
        if self.mode == SessionMode::Client && self.start_module.is_some() {
            return Err(ConfigError::Invalid(
                "a client cannot choose the start module".into(),
            ));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind_addr: self.host.clone(),
            port: self.port,
            event_capacity: self.event_capacity,
            max_decode_failures: self.max_decode_failures,
            ..ServerConfig::default()
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            client_tag: self.client_tag.clone(),
            event_capacity: self.event_capacity,
            max_decode_failures: self.max_decode_failures,
            ..ClientConfig::default()
        }
    }

    pub fn connect_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Open the transport `config` asks for.
pub fn open_network(config: &SessionConfig) -> Result<Network, NetError> {
    match config.mode {
        SessionMode::Solo => Ok(Network::Solo),
        SessionMode::Server => {
            let (server, addr) = start_server(config.server_config())?;
            info!("session server listening on {addr}");
            Ok(Network::Server(Box::new(server)))
        }
        SessionMode::Client => {
            let client = NetClient::connect(&config.connect_addr(), &config.client_config())?;
            info!("joined {} as {}", config.connect_addr(), client.client_tag());
            Ok(Network::Client(Box::new(client)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips() {
        let config = SessionConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        assert_eq!(SessionConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = SessionConfig::from_json(r#"{ "mode": "server", "port": 9000 }"#).unwrap();
        assert_eq!(config.mode, SessionMode::Server);
        assert_eq!(config.port, 9000);
        assert_eq!(config.tick_ms, 50);
        assert_eq!(config.server_config().port, 9000);
        assert_eq!(config.server_config().max_decode_failures, 3);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            SessionConfig::from_json(r#"{ "tick_ms": 0 }"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            SessionConfig::from_json(r#"{ "mode": "client", "start_module": "m" }"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            SessionConfig::from_json(r#"{ "mode": "observer" }"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = SessionConfig::load(Path::new("/nonexistent/partysync.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/partysync.json"));
    }

    #[test]
    fn client_config_carries_tag() {
        let config = SessionConfig {
            mode: SessionMode::Client,
            client_tag: "alice".into(),
            port: 7000,
            ..SessionConfig::default()
        };
        assert_eq!(config.client_config().client_tag, "alice");
        assert_eq!(config.connect_addr(), "127.0.0.1:7000");
    }
}
