use super::*;
use crate::envelope::ListenerEvent;
use crate::error::ListenerError;
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;

fn forwarding(tx: &mpsc::UnboundedSender<ListenerEvent>) -> Listener {
    let tx = tx.clone();
    Listener::from_fn(move |event| {
        let _ = tx.send(event.clone());
    })
}

async fn next(rx: &mut mpsc::UnboundedReceiver<ListenerEvent>) -> ListenerEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for a delivery")
        .expect("listener channel closed")
}

fn peers(hub: &BroadcastHub, channel: &str) -> (EventBus, EventBus) {
    (
        EventBus::with_transport(channel, hub).unwrap(),
        EventBus::with_transport(channel, hub).unwrap(),
    )
}

#[tokio::test]
async fn test_round_trip_forwards_raw_message() {
    let hub = BroadcastHub::new();
    let (a, b) = peers(&hub, "orders");
    let (tx, mut rx) = mpsc::unbounded_channel();

    b.listen("ping", forwarding(&tx));
    a.send("ping", json!({ "n": 1 })).unwrap();

    let event = next(&mut rx).await;
    assert_eq!(event.event, "ping");
    assert_eq!(event.data["payload"]["n"], 1);
    assert_eq!(event.data["event"], "ping");
    assert_eq!(event.wire_payload(), Some(&json!({ "n": 1 })));
}

#[tokio::test]
async fn test_sender_does_not_receive_own_broadcast() {
    let hub = BroadcastHub::new();
    let (a, b) = peers(&hub, "orders");
    let (tx, mut rx) = mpsc::unbounded_channel();

    a.listen("ping", forwarding(&tx));
    a.listen("pong", forwarding(&tx));
    b.listen("ping", forwarding(&tx));

    a.send("ping", json!(1)).unwrap();
    assert_eq!(next(&mut rx).await.event, "ping");

    // a sees b's reply, and nothing of its own broadcast before it.
    b.send("pong", json!(2)).unwrap();
    assert_eq!(next(&mut rx).await.event, "pong");
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_send_after_close_fails() {
    let hub = BroadcastHub::new();
    let bus = EventBus::with_transport("orders", &hub).unwrap();
    assert!(!bus.is_closed());

    bus.close();
    assert!(bus.is_closed());

    match bus.send("ping", json!({ "n": 1 })) {
        Err(BusError::ChannelClosed { channel }) => assert_eq!(channel, "orders"),
        other => panic!("expected ChannelClosed, got {other:?}"),
    }
    assert!(matches!(
        bus.send_json("ping", &[1, 2, 3]),
        Err(BusError::ChannelClosed { .. })
    ));

    bus.close();
    assert!(bus.is_closed());
}

#[tokio::test]
async fn test_listen_and_unlisten_work_after_close() {
    let hub = BroadcastHub::new();
    let bus = EventBus::with_transport("orders", &hub).unwrap();
    let listener = Listener::from_fn(|_| {});

    bus.close();
    let subscription = bus.on("ping", listener.clone());
    assert!(bus.registry().has("ping"));

    bus.off("ping", &listener);
    assert!(!bus.registry().has("ping"));
    assert!(!subscription.unsubscribe());
}

#[tokio::test]
async fn test_closed_bus_ignores_inbound_messages() {
    let hub = BroadcastHub::new();
    let (a, b) = peers(&hub, "orders");
    let (tx, mut rx) = mpsc::unbounded_channel();

    b.listen("ping", forwarding(&tx));
    b.close();

    a.send("ping", json!(1)).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_unlisten_stops_delivery() {
    let hub = BroadcastHub::new();
    let (a, b) = peers(&hub, "orders");
    let (tx, mut rx) = mpsc::unbounded_channel();
    let listener = forwarding(&tx);

    b.listen("ping", listener.clone());
    b.listen("ping", listener.clone());
    b.listen("sync", forwarding(&tx));
    b.unlisten("ping", &listener);

    a.send("ping", json!(1)).unwrap();
    a.send("sync", json!(2)).unwrap();

    assert_eq!(next(&mut rx).await.event, "sync");
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_subscription_from_bus_removes_listener() {
    let hub = BroadcastHub::new();
    let (a, b) = peers(&hub, "orders");
    let (tx, mut rx) = mpsc::unbounded_channel();

    let subscription = b.listen("ping", forwarding(&tx));
    b.listen("sync", forwarding(&tx));
    assert!(subscription.unsubscribe());

    a.send("ping", json!(1)).unwrap();
    a.send("sync", json!(2)).unwrap();

    assert_eq!(next(&mut rx).await.event, "sync");
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_malformed_and_unknown_messages_are_dropped() {
    let hub = BroadcastHub::new();
    let (a, b) = peers(&hub, "orders");
    let (tx, mut rx) = mpsc::unbounded_channel();
    b.listen("ping", forwarding(&tx));

    let raw: MessageHandler = Arc::new(|_| {});
    let intruder = hub.open("orders", raw).unwrap();
    intruder.post_message(&json!("not an envelope")).unwrap();
    intruder.post_message(&json!({ "payload": 1 })).unwrap();
    a.send("unheard-of", json!(0)).unwrap();
    a.send("ping", json!(3)).unwrap();

    let event = next(&mut rx).await;
    assert_eq!(event.data["payload"], 3);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_failing_listener_does_not_block_siblings() {
    let hub = BroadcastHub::new();
    let (a, b) = peers(&hub, "orders");
    let (tx, mut rx) = mpsc::unbounded_channel();

    b.listen(
        "ping",
        Listener::new(|_| Err(ListenerError::Failed("bad listener".to_string()))),
    );
    b.listen("ping", Listener::from_fn(|_| panic!("worse listener")));
    b.listen("ping", forwarding(&tx));

    a.send("ping", json!(1)).unwrap();
    assert_eq!(next(&mut rx).await.event, "ping");

    let stats = b.stats();
    assert_eq!(stats.listener_invocations, 3);
    assert_eq!(stats.listener_faults, 2);
}

#[tokio::test]
async fn test_send_json_serializes_payload() {
    #[derive(Serialize)]
    struct Order {
        id: u32,
        items: Vec<&'static str>,
    }

    let hub = BroadcastHub::new();
    let (a, b) = peers(&hub, "orders");
    let (tx, mut rx) = mpsc::unbounded_channel();
    b.listen("order", forwarding(&tx));

    a.send_json("order", &Order { id: 7, items: vec!["tea"] }).unwrap();

    let event = next(&mut rx).await;
    assert_eq!(event.data["payload"], json!({ "id": 7, "items": ["tea"] }));
}

#[tokio::test]
async fn test_global_hub_connects_buses() {
    let channel = format!("global-{}", uuid::Uuid::new_v4());
    let a = EventBus::new(&channel).unwrap();
    let b = EventBus::new(&channel).unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();

    b.listen("ping", forwarding(&tx));
    a.send("ping", json!({ "n": 1 })).unwrap();

    assert_eq!(next(&mut rx).await.data["payload"]["n"], 1);
    assert_eq!(a.channel_id(), channel);

    a.close();
    b.close();
}

#[tokio::test]
async fn test_open_default_uses_default_channel() {
    let bus = EventBus::open_default().unwrap();
    assert_eq!(bus.channel_id(), "default-channel");
    bus.close();
}

#[tokio::test]
async fn test_from_config_validates() {
    let hub = BroadcastHub::new();

    assert!(matches!(
        EventBus::from_config(&BusConfig::with_channel(""), &hub),
        Err(BusError::Config(_))
    ));

    let bus = EventBus::from_config(&BusConfig::with_channel("orders"), &hub).unwrap();
    assert_eq!(bus.channel_id(), "orders");
}

#[test]
fn test_construction_fails_without_runtime() {
    assert!(matches!(
        EventBus::new("orders"),
        Err(BusError::Construction(_))
    ));
}
