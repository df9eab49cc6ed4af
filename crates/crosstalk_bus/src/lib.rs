//! # Crosstalk Bus
//!
//! A small publish/subscribe layer that lets independent execution contexts
//! sharing a channel identifier exchange named events without holding
//! references to each other.
//!
//! ## Components
//!
//! - [`ListenerRegistry`]: event name → ordered listeners. Register, remove by
//!   identity, emit to all, and compose onto other values with
//!   [`ListenerRegistry::attach`].
//! - [`EventBus`]: one transport handle plus one registry. `send` broadcasts an
//!   `{event, payload}` envelope; inbound envelopes from peers are dispatched to
//!   the local registry.
//! - [`Transport`] / [`TransportHandle`]: the broadcast capability the bus is
//!   layered on. [`BroadcastHub`] is the in-process implementation.
//! - [`codec`]: base64 helpers for binary data inside payloads.
//!
//! ## Example
//!
//! ```rust,no_run
//! use crosstalk_bus::{BroadcastHub, EventBus, Listener};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let hub = BroadcastHub::new();
//!     let sidebar = EventBus::with_transport("session", &hub)?;
//!     let editor = EventBus::with_transport("session", &hub)?;
//!
//!     let subscription = editor.listen("saved", Listener::from_fn(|event| {
//!         println!("document {} saved", event.data["payload"]["id"]);
//!     }));
//!
//!     sidebar.send("saved", json!({ "id": 42 }))?;
//!
//!     subscription.unsubscribe();
//!     sidebar.close();
//!     editor.close();
//!     Ok(())
//! }
//! ```

pub mod bus;
pub mod codec;
pub mod config;
pub mod envelope;
pub mod error;
pub mod registry;
pub mod transport;

pub use bus::EventBus;
pub use codec::{decode_base64, encode_base64_url};
pub use config::{BusConfig, DEFAULT_CHANNEL};
pub use envelope::{Envelope, ListenerEvent};
pub use error::{BusError, DecodeError, ListenerError};
pub use registry::{
    Attached, DispatchReport, EventEmitter, Listener, ListenerFault, ListenerRegistry,
    RegistryStats, Subscription,
};
pub use transport::{BroadcastHub, MessageHandler, Transport, TransportHandle};

/// Crate version, for peers that want to log what they are running.
pub const CROSSTALK_BUS_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type used by bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
