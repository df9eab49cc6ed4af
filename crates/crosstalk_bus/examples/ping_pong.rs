//! Two peers on one channel answering each other's events.
//!
//! Run with `cargo run -p crosstalk_bus --example ping_pong`.

use crosstalk_bus::{BroadcastHub, EventBus, Listener};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let hub = BroadcastHub::new();
    let left = Arc::new(EventBus::with_transport("ping-pong", &hub)?);
    let right = Arc::new(EventBus::with_transport("ping-pong", &hub)?);
    let done = Arc::new(Notify::new());

    let replier = Arc::downgrade(&right);
    right.listen(
        "ping",
        Listener::from_fn(move |event| {
            let n = event.data["payload"]["n"].as_u64().unwrap_or_default();
            println!("right <- ping {n}");
            if let Some(bus) = replier.upgrade() {
                if let Err(e) = bus.send("pong", json!({ "n": n + 1 })) {
                    eprintln!("reply failed: {e}");
                }
            }
        }),
    );

    let finished = done.clone();
    left.listen(
        "pong",
        Listener::from_fn(move |event| {
            println!("left  <- pong {}", event.data["payload"]["n"]);
            finished.notify_one();
        }),
    );

    left.send("ping", json!({ "n": 1 }))?;
    tokio::time::timeout(Duration::from_secs(1), done.notified()).await?;

    left.close();
    right.close();
    Ok(())
}
