//! Error types for the bus, its transport and the codec helpers.

/// Errors raised by [`EventBus`](crate::EventBus) and transport implementations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// The bus (or transport handle) was closed before the send.
    #[error("Unable to send broadcast. The channel '{channel}' has been closed.")]
    ChannelClosed { channel: String },

    /// The transport capability could not be acquired for a channel.
    #[error("Unable to open channel: {0}")]
    Construction(String),

    /// A typed payload could not be converted to a structured value.
    #[error("Payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid bus configuration.
    #[error("Invalid bus configuration: {0}")]
    Config(String),
}

/// Errors produced by, or on behalf of, a single listener during dispatch.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// The listener reported a failure.
    #[error("Listener failed: {0}")]
    Failed(String),

    /// The listener could not read the event data as the type it expected.
    #[error("Listener could not deserialize event data: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// The listener panicked; the panic was contained by the registry.
    #[error("Listener panicked: {0}")]
    Panicked(String),
}

/// Raised by [`decode_base64`](crate::codec::decode_base64) on malformed input.
#[derive(Debug, thiserror::Error)]
#[error("The given data is not a Base64 encoded string: {reason}")]
pub struct DecodeError {
    pub reason: String,
}

impl From<base64::DecodeError> for DecodeError {
    fn from(err: base64::DecodeError) -> Self {
        DecodeError {
            reason: err.to_string(),
        }
    }
}
