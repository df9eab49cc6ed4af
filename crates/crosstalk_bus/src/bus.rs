//! # Event Bus
//!
//! An [`EventBus`] multiplexes named events over a single broadcast channel.
//! Outbound, [`EventBus::send`] wraps `(event, payload)` in an
//! [`Envelope`] and posts it on the transport. Inbound, every message received
//! from a peer is routed by its `event` field to the bus's own
//! [`ListenerRegistry`].
//!
//! Listeners receive the *whole* inbound message as `data`, so a peer's
//! `send("ping", {"n": 1})` reaches a listener as
//! `{"event": "ping", "data": {"event": "ping", "payload": {"n": 1}}}`.
//!
//! A bus does not hear its own broadcasts.
//!
//! ## Lifecycle
//!
//! `Open` → `Closed`. [`EventBus::close`] releases the transport handle and is
//! idempotent; after it, [`EventBus::send`] fails with
//! [`BusError::ChannelClosed`] and inbound messages are dropped. Listening and
//! unlistening keep working since they only touch the local registry.

use crate::config::{BusConfig, DEFAULT_CHANNEL};
use crate::envelope::Envelope;
use crate::error::BusError;
use crate::registry::{Listener, ListenerRegistry, RegistryStats, Subscription};
use crate::transport::{BroadcastHub, MessageHandler, Transport, TransportHandle};
use compact_str::CompactString;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Publish/subscribe endpoint bound to one channel identifier.
pub struct EventBus {
    channel_id: CompactString,
    handle: Box<dyn TransportHandle>,
    registry: ListenerRegistry,
    closed: Arc<AtomicBool>,
}

impl EventBus {
    /// Opens a bus on `channel_id` using the process-wide [`BroadcastHub`].
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(channel_id: &str) -> Result<Self, BusError> {
        Self::with_transport(channel_id, BroadcastHub::global())
    }

    /// Opens a bus on [`DEFAULT_CHANNEL`].
    pub fn open_default() -> Result<Self, BusError> {
        Self::new(DEFAULT_CHANNEL)
    }

    /// Opens a bus on `channel_id` through the given transport.
    pub fn with_transport(channel_id: &str, transport: &dyn Transport) -> Result<Self, BusError> {
        let channel_id = CompactString::new(channel_id);
        let registry = ListenerRegistry::new();
        let closed = Arc::new(AtomicBool::new(false));

        let handle = transport.open(
            &channel_id,
            inbound_handler(channel_id.clone(), registry.clone(), closed.clone()),
        )?;

        info!("📡 Event bus opened on channel '{}'", channel_id);

        Ok(Self {
            channel_id,
            handle,
            registry,
            closed,
        })
    }

    /// Validates `config` and opens a bus on its channel.
    pub fn from_config(config: &BusConfig, transport: &dyn Transport) -> Result<Self, BusError> {
        config.validate()?;
        Self::with_transport(&config.channel_id, transport)
    }

    /// Broadcasts `payload` under `event` to every peer on the channel.
    ///
    /// Fire-and-forget: returns once the message is handed to the transport.
    pub fn send(&self, event: &str, payload: Value) -> Result<(), BusError> {
        self.ensure_open()?;

        debug!("📨 Sending '{}' on channel '{}'", event, self.channel_id);
        self.handle
            .post_message(&Envelope::new(event, payload).into_message())
    }

    /// Serializes `payload` and broadcasts it under `event`.
    pub fn send_json<T>(&self, event: &str, payload: &T) -> Result<(), BusError>
    where
        T: Serialize + ?Sized,
    {
        self.send(event, serde_json::to_value(payload)?)
    }

    /// Registers `listener` for inbound `event` messages.
    pub fn listen(&self, event: &str, listener: Listener) -> Subscription {
        self.registry.on(event, listener)
    }

    /// Alias for [`EventBus::listen`].
    pub fn on(&self, event: &str, listener: Listener) -> Subscription {
        self.listen(event, listener)
    }

    /// Removes every registration of `listener` for `event`.
    pub fn unlisten(&self, event: &str, listener: &Listener) {
        self.registry.off(event, listener)
    }

    /// Alias for [`EventBus::unlisten`].
    pub fn off(&self, event: &str, listener: &Listener) {
        self.unlisten(event, listener)
    }

    /// Releases the transport handle. Subsequent calls do nothing.
    ///
    /// Listeners stay registered.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.handle.close();
        info!("🔒 Event bus closed on channel '{}'", self.channel_id);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// The bus's listener registry, for composing pub/sub onto other values.
    pub fn registry(&self) -> &ListenerRegistry {
        &self.registry
    }

    pub fn stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    fn ensure_open(&self) -> Result<(), BusError> {
        if self.is_closed() {
            return Err(BusError::ChannelClosed {
                channel: self.channel_id.to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("channel_id", &self.channel_id)
            .field("closed", &self.is_closed())
            .field("registry", &self.registry)
            .finish()
    }
}

fn inbound_handler(
    channel_id: CompactString,
    registry: ListenerRegistry,
    closed: Arc<AtomicBool>,
) -> MessageHandler {
    Arc::new(move |message: Value| {
        if closed.load(Ordering::Acquire) {
            return;
        }

        let Some(event) = Envelope::event_name(&message).map(str::to_owned) else {
            warn!(
                "⚠️ Dropping malformed message on channel '{}': {}",
                channel_id, message
            );
            return;
        };

        if !registry.has(&event) {
            debug!("No listeners for '{}' on channel '{}'", event, channel_id);
            return;
        }

        let report = registry.emit(&event, message);
        if !report.is_clean() {
            warn!(
                "⚠️ {} of {} listener(s) for '{}' failed on channel '{}'",
                report.faults.len(),
                report.invoked(),
                event,
                channel_id
            );
        }
    })
}

#[cfg(test)]
mod tests;
