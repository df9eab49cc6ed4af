use super::*;
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;

fn collector() -> (MessageHandler, mpsc::UnboundedReceiver<Value>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler: MessageHandler = Arc::new(move |message| {
        let _ = tx.send(message);
    });
    (handler, rx)
}

async fn next(rx: &mut mpsc::UnboundedReceiver<Value>) -> Value {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for a broadcast")
        .expect("handler channel closed")
}

#[test]
fn test_open_requires_runtime() {
    let hub = BroadcastHub::new();
    let (handler, _rx) = collector();

    match hub.open("orders", handler) {
        Err(BusError::Construction(message)) => assert!(message.contains("orders")),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("open succeeded without a runtime"),
    }
}

#[tokio::test]
async fn test_open_rejects_empty_channel() {
    let hub = BroadcastHub::new();
    let (handler, _rx) = collector();

    assert!(matches!(
        hub.open("", handler),
        Err(BusError::Construction(_))
    ));
}

#[tokio::test]
async fn test_broadcast_reaches_peers_but_not_sender() {
    let hub = BroadcastHub::new();
    let (handler_a, mut rx_a) = collector();
    let (handler_b, mut rx_b) = collector();
    let a = hub.open("orders", handler_a).unwrap();
    let b = hub.open("orders", handler_b).unwrap();

    a.post_message(&json!({ "from": "a" })).unwrap();
    assert_eq!(next(&mut rx_b).await, json!({ "from": "a" }));

    // Frames arrive in order, so once a's receiver yields b's frame it has
    // already seen (and skipped) its own.
    b.post_message(&json!({ "from": "b" })).unwrap();
    assert_eq!(next(&mut rx_a).await, json!({ "from": "b" }));
    assert!(rx_a.try_recv().is_err());
    assert_eq!(a.channel_id(), "orders");
}

#[tokio::test]
async fn test_channels_are_isolated() {
    let hub = BroadcastHub::new();
    let (handler_a, _rx_a) = collector();
    let (handler_b, mut rx_b) = collector();
    let (handler_c, mut rx_c) = collector();
    let a = hub.open("orders", handler_a).unwrap();
    let _b = hub.open("orders", handler_b).unwrap();
    let _c = hub.open("billing", handler_c).unwrap();

    a.post_message(&json!(1)).unwrap();
    assert_eq!(next(&mut rx_b).await, json!(1));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(rx_c.try_recv().is_err());
}

#[tokio::test]
async fn test_closed_handle_rejects_posts_and_stops_receiving() {
    let hub = BroadcastHub::new();
    let (handler_a, _rx_a) = collector();
    let (handler_b, mut rx_b) = collector();
    let a = hub.open("orders", handler_a).unwrap();
    let b = hub.open("orders", handler_b).unwrap();

    b.close();
    b.close();
    assert!(matches!(
        b.post_message(&json!(1)),
        Err(BusError::ChannelClosed { .. })
    ));

    a.post_message(&json!("after close")).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(rx_b.try_recv().is_err());
}

#[tokio::test]
async fn test_hubs_do_not_share_channels() {
    let first = BroadcastHub::new();
    let second = BroadcastHub::with_capacity(0);
    let (handler_a, _rx_a) = collector();
    let (handler_b, mut rx_b) = collector();
    let a = first.open("orders", handler_a).unwrap();
    let _b = second.open("orders", handler_b).unwrap();

    assert_eq!(second.capacity(), 1);
    assert_eq!(first.peer_count("orders"), 1);

    a.post_message(&json!(1)).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(rx_b.try_recv().is_err());
}

async fn settle(hub: &BroadcastHub, channels: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while hub.channel_count() != channels {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("channel entries were not released");
}

#[tokio::test]
async fn test_channels_are_released_after_last_handle_closes() {
    let hub = BroadcastHub::new();
    let handles: Vec<_> = (0..200)
        .map(|i| {
            let (handler, _rx) = collector();
            hub.open(&format!("c{i}"), handler).unwrap()
        })
        .collect();
    let (handler_a, _rx_a) = collector();
    let (handler_b, _rx_b) = collector();
    let a = hub.open("shared", handler_a).unwrap();
    let b = hub.open("shared", handler_b).unwrap();
    assert_eq!(hub.channel_count(), 201);

    for handle in &handles {
        handle.close();
    }
    a.close();
    settle(&hub, 1).await;
    assert_eq!(hub.peer_count("shared"), 1);

    drop(b);
    settle(&hub, 0).await;
    assert_eq!(hub.peer_count("shared"), 0);
}

#[tokio::test]
async fn test_released_channel_can_be_reopened() {
    let hub = BroadcastHub::new();
    let (handler, _rx) = collector();
    hub.open("orders", handler).unwrap().close();
    settle(&hub, 0).await;

    let (handler_a, _rx_a) = collector();
    let (handler_b, mut rx_b) = collector();
    let a = hub.open("orders", handler_a).unwrap();
    let _b = hub.open("orders", handler_b).unwrap();

    a.post_message(&json!("again")).unwrap();
    assert_eq!(next(&mut rx_b).await, json!("again"));
    assert_eq!(hub.channel_count(), 1);
}

#[tokio::test]
async fn test_frames_queued_before_close_are_not_delivered() {
    let hub = BroadcastHub::new();
    let (handler_a, _rx_a) = collector();
    let (handler_b, mut rx_b) = collector();
    let a = hub.open("orders", handler_a).unwrap();
    let b = hub.open("orders", handler_b).unwrap();

    for n in 0..3 {
        a.post_message(&json!(n)).unwrap();
    }
    assert_eq!(hub.backlog("orders"), 3);
    b.close();

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(rx_b.try_recv().is_err());
}
