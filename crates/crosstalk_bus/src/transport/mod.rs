//! # Transport Capability
//!
//! The bus never moves bytes itself. It asks a [`Transport`] for a handle bound
//! to a channel identifier, posts structured messages through that handle, and
//! receives every broadcast from its peers through the [`MessageHandler`] it
//! supplied when opening.
//!
//! [`BroadcastHub`] is the in-process implementation shipped with the crate.

mod hub;

#[cfg(test)]
mod tests;

pub use hub::{BroadcastHub, DEFAULT_HUB_CAPACITY};

use crate::error::BusError;
use serde_json::Value;
use std::sync::Arc;

/// Callback invoked once per broadcast received by a handle.
pub type MessageHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Factory for channel-scoped transport handles.
pub trait Transport: Send + Sync {
    /// Opens a handle on `channel_id`.
    ///
    /// `on_message` is called with the original structured message for every
    /// broadcast posted by *another* handle on the same channel, until the
    /// returned handle is closed.
    fn open(
        &self,
        channel_id: &str,
        on_message: MessageHandler,
    ) -> Result<Box<dyn TransportHandle>, BusError>;
}

/// An open, exclusively owned connection to one broadcast channel.
pub trait TransportHandle: Send + Sync {
    /// Broadcasts `message` to every other handle on the channel.
    fn post_message(&self, message: &Value) -> Result<(), BusError>;

    /// Releases the handle. No delivery starts after this returns; a call to
    /// the message handler already running on another thread may still finish.
    /// Calling it more than once is harmless.
    fn close(&self);

    /// The channel identifier the handle was opened with.
    fn channel_id(&self) -> &str;
}
