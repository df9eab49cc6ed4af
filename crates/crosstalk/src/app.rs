//! Main application logic and session lifecycle.
//!
//! The `Application` opens a set of peers on one broadcast channel, has the
//! first peer send the configured messages, waits until every other peer has
//! received them, then closes everything and reports what happened.

use crate::{cli::CliArgs, config::AppConfig, logging::display_banner};
use crosstalk_bus::{
    decode_base64, encode_base64_url, BroadcastHub, EventBus, Listener, ListenerError,
    ListenerEvent,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// One message observed by one receiving peer.
#[derive(Debug, Clone)]
struct Delivery {
    peer: usize,
    seq: u64,
    bytes: usize,
}

/// Outcome of a simulated session.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionSummary {
    pub channel: String,
    pub event: String,
    pub peers: usize,
    pub sent: u32,
    pub expected: usize,
    pub received: usize,
    /// Deliveries per peer, indexed by peer position (the sender is 0)
    pub per_peer: Vec<usize>,
    /// Decoded payload bytes, in binary mode
    pub decoded_bytes: usize,
    pub listener_faults: u64,
    pub elapsed_ms: u128,
}

impl SessionSummary {
    pub fn is_complete(&self) -> bool {
        self.received >= self.expected
    }
}

/// Main application struct.
pub struct Application {
    config: AppConfig,
    hub: BroadcastHub,
}

impl Application {
    /// Creates a new application instance.
    ///
    /// 1. Load configuration from file (creating default if missing)
    /// 2. Apply command-line argument overrides
    /// 3. Validate merged configuration
    /// 4. Display startup banner
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        config.apply_overrides(&args);

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        } else {
            info!("✅ Configuration loaded and validated successfully");
        }

        display_banner();

        Ok(Self::from_config(config))
    }

    /// Creates an application from an already validated configuration.
    pub fn from_config(config: AppConfig) -> Self {
        let hub = BroadcastHub::with_capacity(config.bus.capacity);
        Self { config, hub }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Runs one session and returns its summary.
    ///
    /// Fails if a peer cannot be opened, a send fails, or not every expected
    /// delivery arrived before the timeout.
    pub async fn run(self) -> Result<SessionSummary, Box<dyn std::error::Error>> {
        let session = &self.config.session;
        let started = Instant::now();

        info!(
            "🚀 Opening {} peers on channel '{}'",
            session.peers, self.config.bus.channel_id
        );

        let peers = (0..session.peers)
            .map(|_| EventBus::from_config(&self.config.bus, &self.hub))
            .collect::<Result<Vec<_>, _>>()?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        for (index, peer) in peers.iter().enumerate().skip(1) {
            peer.listen(&session.event, receiver(index, session.binary, tx.clone()));
        }
        drop(tx);

        let payload = session.payload_value()?;
        let deadline = started + Duration::from_millis(session.timeout_ms);
        let mut sent = 0;
        for seq in 0..session.count {
            if !self.wait_for_room(deadline).await {
                warn!(
                    "⏱️ Receivers fell behind, stopped after {} of {} message(s)",
                    sent, session.count
                );
                break;
            }
            peers[0].send(&session.event, outbound(seq, &payload, session.binary))?;
            sent += 1;
        }
        debug!("📨 Sent {} message(s) as '{}'", sent, session.event);

        let mut summary = SessionSummary {
            channel: self.config.bus.channel_id.clone(),
            event: session.event.clone(),
            peers: session.peers,
            sent,
            expected: session.expected_deliveries(),
            per_peer: vec![0; session.peers],
            ..SessionSummary::default()
        };

        while summary.received < summary.expected {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(delivery)) => {
                    debug!(
                        "📥 Peer {} received message #{} ({} bytes)",
                        delivery.peer, delivery.seq, delivery.bytes
                    );
                    summary.received += 1;
                    summary.per_peer[delivery.peer] += 1;
                    summary.decoded_bytes += delivery.bytes;
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "⏱️ Timed out after {}ms with {}/{} deliveries",
                        session.timeout_ms, summary.received, summary.expected
                    );
                    break;
                }
            }
        }

        for peer in &peers {
            summary.listener_faults += peer.stats().listener_faults;
            peer.close();
        }
        summary.elapsed_ms = started.elapsed().as_millis();

        info!(
            "📊 Session on '{}': {}/{} deliveries across {} peers in {}ms",
            summary.channel, summary.received, summary.expected, summary.peers, summary.elapsed_ms
        );
        if summary.listener_faults > 0 {
            warn!("⚠️ {} listener fault(s) during the session", summary.listener_faults);
        }

        if !summary.is_complete() {
            error!("❌ Session incomplete");
            return Err(format!(
                "Session incomplete: {} of {} deliveries arrived",
                summary.received, summary.expected
            )
            .into());
        }

        info!("✅ Session complete");
        Ok(summary)
    }

    /// Waits until every receiver on the channel can take one more frame
    /// without lagging. Returns `false` if `deadline` passes first.
    async fn wait_for_room(&self, deadline: Instant) -> bool {
        let channel = &self.config.bus.channel_id;
        while self.hub.backlog(channel) >= self.hub.capacity() {
            if Instant::now() >= deadline {
                return false;
            }
            tokio::task::yield_now().await;
        }
        true
    }
}

/// Message the sending peer broadcasts for sequence number `seq`.
fn outbound(seq: u32, payload: &Value, binary: bool) -> Value {
    if binary {
        json!({ "seq": seq, "blob": encode_base64_url(payload.to_string().as_bytes()) })
    } else {
        json!({ "seq": seq, "data": payload })
    }
}

/// Listener for a receiving peer that reports each delivery on `tx`.
fn receiver(peer: usize, binary: bool, tx: mpsc::UnboundedSender<Delivery>) -> Listener {
    Listener::new(move |event: &ListenerEvent| {
        let body = event
            .wire_payload()
            .ok_or_else(|| ListenerError::Failed("message has no payload".to_string()))?;
        let seq = body["seq"]
            .as_u64()
            .ok_or_else(|| ListenerError::Failed("message has no sequence number".to_string()))?;

        let bytes = if binary {
            let blob = body["blob"]
                .as_str()
                .ok_or_else(|| ListenerError::Failed("message has no blob".to_string()))?;
            decode_base64(blob)
                .map_err(|e| ListenerError::Failed(e.to_string()))?
                .len()
        } else {
            0
        };

        tx.send(Delivery { peer, seq, bytes })
            .map_err(|_| ListenerError::Failed("session already finished".to_string()))
    })
}
