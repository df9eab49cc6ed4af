//! Configuration management for the crosstalk peer simulator.
//!
//! This module handles loading, validation, and CLI overrides of the
//! simulator configuration stored in a TOML file.

use crate::cli::CliArgs;
use crosstalk_bus::BusConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use tracing::info;

fn default_peers() -> usize {
    2
}

fn default_event() -> String {
    "ping".to_string()
}

fn default_payload() -> String {
    r#"{"n":1}"#.to_string()
}

fn default_count() -> u32 {
    1
}

fn default_timeout_ms() -> u64 {
    2000
}

fn default_level() -> String {
    "info".to_string()
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Channel and hub settings shared by every peer
    #[serde(default)]
    pub bus: BusConfig,
    /// What the simulated session sends
    #[serde(default)]
    pub session: SessionSettings,
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Settings for one simulated exchange between peers.
///
/// The first peer sends `count` messages under `event`; every other peer
/// listens for them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Number of peers opened on the channel
    #[serde(default = "default_peers")]
    pub peers: usize,
    /// Event name the messages are sent under
    #[serde(default = "default_event")]
    pub event: String,
    /// Payload as JSON text
    #[serde(default = "default_payload")]
    pub payload: String,
    /// Number of messages the first peer sends
    #[serde(default = "default_count")]
    pub count: u32,
    /// How long to wait for every delivery, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Carry the payload as base64-encoded bytes instead of JSON
    #[serde(default)]
    pub binary: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            peers: default_peers(),
            event: default_event(),
            payload: default_payload(),
            count: default_count(),
            timeout_ms: default_timeout_ms(),
            binary: false,
        }
    }
}

impl SessionSettings {
    /// Parses the configured payload text.
    pub fn payload_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }

    /// Deliveries a complete session produces: every message reaches every
    /// peer except the sender.
    pub fn expected_deliveries(&self) -> usize {
        self.count as usize * self.peers.saturating_sub(1)
    }
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_level")]
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file, creating a default one if the
    /// file does not exist.
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Applies command-line overrides on top of the file configuration.
    pub fn apply_overrides(&mut self, args: &CliArgs) {
        if let Some(channel) = &args.channel {
            self.bus.channel_id = channel.clone();
        }

        if let Some(peers) = args.peers {
            self.session.peers = peers;
        }

        if let Some(event) = &args.event {
            self.session.event = event.clone();
        }

        if let Some(payload) = &args.payload {
            self.session.payload = payload.clone();
        }

        if let Some(count) = args.count {
            self.session.count = count;
        }

        if args.binary {
            self.session.binary = true;
        }

        if let Some(log_level) = &args.log_level {
            self.logging.level = log_level.clone();
        }

        if args.json_logs {
            self.logging.json_format = true;
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        self.bus.validate().map_err(|e| e.to_string())?;

        if self.session.peers < 2 {
            return Err(format!(
                "At least 2 peers are needed to exchange events, got {}",
                self.session.peers
            ));
        }

        if self.session.event.is_empty() {
            return Err("Event name cannot be empty".to_string());
        }

        if self.session.count == 0 {
            return Err("Message count must be greater than 0".to_string());
        }

        if self.session.timeout_ms == 0 {
            return Err("Session timeout must be greater than 0".to_string());
        }

        if let Err(e) = self.session.payload_value() {
            return Err(format!("Payload is not valid JSON: {e}"));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}
