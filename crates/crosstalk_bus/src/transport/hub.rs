//! In-process broadcast transport built on `tokio::sync::broadcast`.
//!
//! Each channel identifier maps to one broadcast sender shared by every handle
//! opened on it. Every handle owns a receiver drained by a task on the current
//! tokio runtime; frames carry the id of the handle that posted them so a
//! handle never sees its own broadcasts.
//!
//! A channel's entry is removed once its last receiver is gone, so the hub
//! only holds channels that still have open handles.

use super::{MessageHandler, Transport, TransportHandle};
use crate::error::BusError;
use compact_str::CompactString;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// Per-channel buffer size used by [`BroadcastHub::new`].
pub const DEFAULT_HUB_CAPACITY: usize = 256;

static GLOBAL_HUB: Lazy<BroadcastHub> = Lazy::new(BroadcastHub::new);

#[derive(Debug, Clone)]
struct Frame {
    origin: Uuid,
    message: Value,
}

struct HubInner {
    channels: DashMap<CompactString, broadcast::Sender<Frame>>,
    capacity: usize,
}

impl HubInner {
    /// Returns the channel's sender and a fresh receiver on it.
    ///
    /// Subscribing under the entry lock keeps [`HubInner::prune`] from removing
    /// the channel between the lookup and the subscription.
    fn join(&self, channel_id: &str) -> (broadcast::Sender<Frame>, broadcast::Receiver<Frame>) {
        let sender = self
            .channels
            .entry(CompactString::new(channel_id))
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        let receiver = sender.subscribe();
        (sender.value().clone(), receiver)
    }

    /// Drops the channel entry if nobody is listening on it any more.
    fn prune(&self, channel_id: &str) {
        if self
            .channels
            .remove_if(channel_id, |_, sender| sender.receiver_count() == 0)
            .is_some()
        {
            debug!("🧹 Released channel '{}'", channel_id);
        }
    }
}

/// A handle's receiver, tied to the hub so the channel entry can be released
/// when the last receiver goes away.
struct Membership {
    receiver: Option<broadcast::Receiver<Frame>>,
    hub: Weak<HubInner>,
    channel: CompactString,
}

impl Drop for Membership {
    fn drop(&mut self) {
        // The receiver must be gone before the count is checked.
        drop(self.receiver.take());
        if let Some(hub) = self.hub.upgrade() {
            hub.prune(&self.channel);
        }
    }
}

/// Shared in-process broadcast groups, keyed by channel identifier.
///
/// Clones share the same groups. Opening a handle requires a tokio runtime.
#[derive(Clone)]
pub struct BroadcastHub {
    inner: Arc<HubInner>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HUB_CAPACITY)
    }

    /// Creates a hub whose channels buffer up to `capacity` undelivered frames
    /// per receiver. Slower receivers skip the overflow and log a warning.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                channels: DashMap::new(),
                capacity: capacity.max(1),
            }),
        }
    }

    /// The process-wide hub used by [`EventBus::new`](crate::EventBus::new).
    pub fn global() -> &'static BroadcastHub {
        &GLOBAL_HUB
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Number of live receivers on `channel_id`.
    ///
    /// A closed handle's receiver is released when its task winds down, so the
    /// count may lag briefly behind `close`.
    pub fn peer_count(&self, channel_id: &str) -> usize {
        self.inner
            .channels
            .get(channel_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    /// Frames on `channel_id` that at least one receiver has not consumed yet.
    ///
    /// A receiver falls behind and loses frames once this would exceed
    /// [`BroadcastHub::capacity`], so producers that publish in bursts can
    /// wait on it.
    pub fn backlog(&self, channel_id: &str) -> usize {
        self.inner
            .channels
            .get(channel_id)
            .map(|sender| sender.len())
            .unwrap_or(0)
    }

    /// Number of channels with at least one live receiver (or one still
    /// winding down after `close`).
    pub fn channel_count(&self) -> usize {
        self.inner.channels.len()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BroadcastHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastHub")
            .field("channels", &self.inner.channels.len())
            .field("capacity", &self.inner.capacity)
            .finish()
    }
}

impl Transport for BroadcastHub {
    fn open(
        &self,
        channel_id: &str,
        on_message: MessageHandler,
    ) -> Result<Box<dyn TransportHandle>, BusError> {
        if channel_id.is_empty() {
            return Err(BusError::Construction(
                "channel identifier must not be empty".to_string(),
            ));
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            BusError::Construction(format!(
                "no async runtime available for channel '{}': {}",
                channel_id, e
            ))
        })?;

        // Subscribe before returning so nothing posted after `open` is missed.
        let (sender, receiver) = self.inner.join(channel_id);
        let id = Uuid::new_v4();
        let channel = CompactString::new(channel_id);
        let closed = Arc::new(AtomicBool::new(false));

        let membership = Membership {
            receiver: Some(receiver),
            hub: Arc::downgrade(&self.inner),
            channel: channel.clone(),
        };
        let task = runtime.spawn(pump(id, membership, on_message, closed.clone()));

        debug!("🔌 Opened handle {} on channel '{}'", id, channel);

        Ok(Box::new(HubHandle {
            id,
            channel,
            sender,
            closed,
            task,
        }))
    }
}

async fn pump(
    id: Uuid,
    mut membership: Membership,
    on_message: MessageHandler,
    closed: Arc<AtomicBool>,
) {
    let Some(receiver) = membership.receiver.as_mut() else {
        return;
    };

    loop {
        match receiver.recv().await {
            Ok(frame) => {
                if frame.origin == id {
                    continue;
                }
                // Checked right before delivery: nothing new starts after close.
                if closed.load(Ordering::Acquire) {
                    break;
                }
                on_message(frame.message);
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(
                    "⚠️ Handle {} on channel '{}' lagged, dropped {} message(s)",
                    id, membership.channel, skipped
                );
            }
            Err(RecvError::Closed) => break,
        }
    }
}

struct HubHandle {
    id: Uuid,
    channel: CompactString,
    sender: broadcast::Sender<Frame>,
    closed: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl TransportHandle for HubHandle {
    fn post_message(&self, message: &Value) -> Result<(), BusError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BusError::ChannelClosed {
                channel: self.channel.to_string(),
            });
        }

        let frame = Frame {
            origin: self.id,
            message: message.clone(),
        };

        // Only fails when there are no receivers at all, which is not an error
        // for a fire-and-forget broadcast.
        if self.sender.send(frame).is_err() {
            debug!("No receivers on channel '{}'", self.channel);
        }
        Ok(())
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.task.abort();
            debug!("🔌 Closed handle {} on channel '{}'", self.id, self.channel);
        }
    }

    fn channel_id(&self) -> &str {
        &self.channel
    }
}

impl Drop for HubHandle {
    fn drop(&mut self) {
        self.close();
    }
}
