//! Bus configuration.

use crate::error::BusError;
use crate::transport::DEFAULT_HUB_CAPACITY;
use serde::{Deserialize, Serialize};

/// Channel used when none is given.
pub const DEFAULT_CHANNEL: &str = "default-channel";

fn default_channel_id() -> String {
    DEFAULT_CHANNEL.to_string()
}

fn default_capacity() -> usize {
    DEFAULT_HUB_CAPACITY
}

/// Settings for opening a bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusConfig {
    /// Channel identifier shared by all peers of the bus
    #[serde(default = "default_channel_id")]
    pub channel_id: String,
    /// Per-channel buffer size for the in-process hub
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            channel_id: default_channel_id(),
            capacity: default_capacity(),
        }
    }
}

impl BusConfig {
    pub fn with_channel(channel_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), BusError> {
        if self.channel_id.is_empty() {
            return Err(BusError::Config(
                "channel_id cannot be empty".to_string(),
            ));
        }

        if self.capacity == 0 {
            return Err(BusError::Config(
                "capacity must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}
