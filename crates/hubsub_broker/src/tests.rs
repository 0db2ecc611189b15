use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::timeout;
use uuid::Uuid;

use hubsub_config::{BrokerSettings, OverflowPolicy};
use hubsub_wire::{ErrorCode, Message, ServerFrame, INFO_SERVER_SHUTDOWN, INFO_TOPIC_DELETED};

use super::engine::{Broker, BrokerError};
use super::pump::run_delivery_pump;
use super::subscriber::{DeliveryFrame, EnqueueResult, Outbound, Subscriber};

fn message(payload: serde_json::Value) -> Message {
    Message {
        id: Uuid::new_v4(),
        payload,
    }
}

fn settings_with(queue: usize, history: usize) -> BrokerSettings {
    BrokerSettings {
        max_subscriber_queue_size: queue,
        topic_history_size: history,
        ..BrokerSettings::default()
    }
}

async fn recv_frame(rx: &mut UnboundedReceiver<Outbound>) -> ServerFrame {
    match timeout(Duration::from_secs(1), rx.recv()).await {
        Ok(Some(Outbound::Frame(frame))) => frame,
        other => panic!("expected a frame, got {other:?}"),
    }
}

async fn recv_close(rx: &mut UnboundedReceiver<Outbound>) {
    match timeout(Duration::from_secs(1), rx.recv()).await {
        Ok(Some(Outbound::Close)) => {}
        other => panic!("expected close, got {other:?}"),
    }
}

#[tokio::test]
async fn fanout_delivers_to_every_subscriber() {
    let broker = Broker::new(BrokerSettings::default());
    broker.create_topic("orders").await.expect("create");

    let (tx_a, mut rx_a) = mpsc::unbounded_channel();
    let (tx_b, mut rx_b) = mpsc::unbounded_channel();
    let (sub_a, _) = broker.subscribe("orders", "A", tx_a, 0).await.expect("subscribe A");
    let (sub_b, _) = broker.subscribe("orders", "B", tx_b, 0).await.expect("subscribe B");
    tokio::spawn(run_delivery_pump(sub_a));
    tokio::spawn(run_delivery_pump(sub_b));

    let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
    let delivered = broker
        .publish(
            "orders",
            Message {
                id,
                payload: json!({"n": 1}),
            },
        )
        .await
        .expect("publish");
    assert_eq!(delivered, 2);

    for rx in [&mut rx_a, &mut rx_b] {
        match recv_frame(rx).await {
            ServerFrame::Event { topic, message, .. } => {
                assert_eq!(topic, "orders");
                assert_eq!(message.id, id);
                assert_eq!(message.payload, json!({"n": 1}));
            }
            other => panic!("expected event, got {other:?}"),
        }
    }

    let stats = broker.stats().await;
    let orders = &stats["orders"];
    assert_eq!(orders.messages, 1);
    assert_eq!(orders.subscribers, 2);
}

#[tokio::test]
async fn subscribe_replays_last_n_oldest_first() {
    let broker = Broker::new(BrokerSettings::default());
    broker.create_topic("t").await.expect("create");
    for i in 1..=3 {
        broker
            .publish("t", message(json!({"i": i})))
            .await
            .expect("publish");
    }

    let (tx, _rx) = mpsc::unbounded_channel();
    let (_sub, history) = broker.subscribe("t", "C", tx, 2).await.expect("subscribe");
    let payloads: Vec<_> = history.iter().map(|e| e.message.payload.clone()).collect();
    assert_eq!(payloads, vec![json!({"i": 2}), json!({"i": 3})]);
}

#[tokio::test]
async fn replay_is_a_prefix_of_the_live_stream() {
    let broker = Broker::new(BrokerSettings::default());
    broker.create_topic("t").await.expect("create");
    for i in 1..=3 {
        broker
            .publish("t", message(json!({"i": i})))
            .await
            .expect("publish");
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let (sub, history) = broker.subscribe("t", "C", tx, 2).await.expect("subscribe");
    assert_eq!(history.len(), 2);
    tokio::spawn(run_delivery_pump(sub));

    // The next live event is the first thing on the wire; none of the
    // replayed messages show up again.
    broker
        .publish("t", message(json!({"i": 4})))
        .await
        .expect("publish");
    match recv_frame(&mut rx).await {
        ServerFrame::Event { message, .. } => assert_eq!(message.payload, json!({"i": 4})),
        other => panic!("expected event, got {other:?}"),
    }
}

#[tokio::test]
async fn overflow_drops_oldest_and_keeps_queue_bounded() {
    let broker = Broker::new(settings_with(3, 100));
    broker.create_topic("t").await.expect("create");

    // No pump: simulate a slow consumer.
    let (tx, _rx) = mpsc::unbounded_channel();
    let (sub, _) = broker.subscribe("t", "D", tx, 0).await.expect("subscribe");

    for i in 1..=4 {
        let delivered = broker
            .publish("t", message(json!({"i": i})))
            .await
            .expect("publish");
        assert_eq!(delivered, 1);
    }

    assert_eq!(sub.queue_len(), 3);
    for expected in 2..=4 {
        let frame = sub.next().await.expect("queued frame");
        assert_eq!(frame.message.payload, json!({"i": expected}));
    }
    assert_eq!(sub.queue_len(), 0);
}

#[tokio::test]
async fn publish_is_isolated_to_its_topic() {
    let broker = Broker::new(BrokerSettings::default());
    broker.create_topic("t1").await.expect("create t1");
    broker.create_topic("t2").await.expect("create t2");

    let (tx_e, mut rx_e) = mpsc::unbounded_channel();
    let (tx_f, mut rx_f) = mpsc::unbounded_channel();
    let (sub_e, _) = broker.subscribe("t1", "E", tx_e, 0).await.expect("subscribe E");
    let (sub_f, _) = broker.subscribe("t2", "F", tx_f, 0).await.expect("subscribe F");
    tokio::spawn(run_delivery_pump(sub_e));
    tokio::spawn(run_delivery_pump(sub_f));

    broker
        .publish("t1", message(json!({"m": true})))
        .await
        .expect("publish");

    match recv_frame(&mut rx_e).await {
        ServerFrame::Event { topic, .. } => assert_eq!(topic, "t1"),
        other => panic!("expected event, got {other:?}"),
    }
    assert!(
        timeout(Duration::from_millis(100), rx_f.recv()).await.is_err(),
        "subscriber of t2 must receive nothing"
    );
}

#[tokio::test]
async fn delete_topic_notifies_and_deactivates_subscribers() {
    let broker = Broker::new(BrokerSettings::default());
    broker.create_topic("td").await.expect("create");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let (sub, _) = broker.subscribe("td", "G", tx, 0).await.expect("subscribe");

    broker.delete_topic("td").await.expect("delete");

    match recv_frame(&mut rx).await {
        ServerFrame::Info { topic, msg, .. } => {
            assert_eq!(topic.as_deref(), Some("td"));
            assert_eq!(msg, INFO_TOPIC_DELETED);
        }
        other => panic!("expected info, got {other:?}"),
    }
    assert!(!sub.is_active());

    let err = broker
        .publish("td", message(json!({})))
        .await
        .expect_err("publish after delete");
    assert_eq!(err, BrokerError::TopicNotFound("td".to_string()));
}

#[tokio::test]
async fn history_ring_is_bounded() {
    let broker = Broker::new(settings_with(100, 2));
    broker.create_topic("t").await.expect("create");
    for i in 1..=3 {
        broker
            .publish("t", message(json!({"i": i})))
            .await
            .expect("publish");
    }

    let (tx, _rx) = mpsc::unbounded_channel();
    let (_sub, history) = broker.subscribe("t", "C", tx, 10).await.expect("subscribe");
    let payloads: Vec<_> = history.iter().map(|e| e.message.payload.clone()).collect();
    assert_eq!(payloads, vec![json!({"i": 2}), json!({"i": 3})]);
}

#[tokio::test]
async fn zero_last_n_returns_no_history() {
    let broker = Broker::new(BrokerSettings::default());
    broker.create_topic("t").await.expect("create");
    broker
        .publish("t", message(json!({"i": 1})))
        .await
        .expect("publish");

    let (tx, _rx) = mpsc::unbounded_channel();
    let (_sub, history) = broker.subscribe("t", "C", tx, 0).await.expect("subscribe");
    assert!(history.is_empty());
}

#[tokio::test]
async fn create_topic_twice_reports_conflict() {
    let broker = Broker::new(BrokerSettings::default());
    broker.create_topic("t").await.expect("first create");
    let err = broker.create_topic("t").await.expect_err("second create");
    assert_eq!(err, BrokerError::TopicExists("t".to_string()));
}

#[tokio::test]
async fn unsubscribe_is_idempotent() {
    let broker = Broker::new(BrokerSettings::default());
    broker.create_topic("t").await.expect("create");
    let (tx, _rx) = mpsc::unbounded_channel();
    broker.subscribe("t", "C", tx, 0).await.expect("subscribe");

    assert!(broker.unsubscribe("t", "C").await.expect("first"));
    assert!(!broker.unsubscribe("t", "C").await.expect("second"));
    assert_eq!(broker.total_subscribers().await, 0);
}

#[tokio::test]
async fn duplicate_client_id_on_one_topic_is_rejected() {
    let broker = Broker::new(BrokerSettings::default());
    broker.create_topic("t").await.expect("create");
    let (tx_one, _rx_one) = mpsc::unbounded_channel();
    let (tx_two, _rx_two) = mpsc::unbounded_channel();
    broker.subscribe("t", "C", tx_one, 0).await.expect("first");

    let err = broker
        .subscribe("t", "C", tx_two, 0)
        .await
        .expect_err("second");
    assert_eq!(
        err,
        BrokerError::DuplicateSubscriber {
            topic: "t".to_string(),
            client_id: "C".to_string(),
        }
    );
    // The same client id is fine on a different topic.
    broker.create_topic("u").await.expect("create u");
    let (tx_three, _rx_three) = mpsc::unbounded_channel();
    broker.subscribe("u", "C", tx_three, 0).await.expect("other topic");
}

#[tokio::test]
async fn publish_to_unknown_topic_fails() {
    let broker = Broker::new(BrokerSettings::default());
    let err = broker
        .publish("nowhere", message(json!({})))
        .await
        .expect_err("publish");
    assert_eq!(err, BrokerError::TopicNotFound("nowhere".to_string()));
}

#[tokio::test]
async fn message_count_increments_per_publish() {
    let broker = Broker::new(BrokerSettings::default());
    broker.create_topic("t").await.expect("create");
    for _ in 0..5 {
        broker.publish("t", message(json!({}))).await.expect("publish");
    }
    let stats = broker.stats().await;
    assert_eq!(stats["t"].messages, 5);
}

#[tokio::test]
async fn list_reports_subscriber_counts() {
    let broker = Broker::new(BrokerSettings::default());
    broker.create_topic("a").await.expect("create a");
    broker.create_topic("b").await.expect("create b");
    let (tx, _rx) = mpsc::unbounded_channel();
    broker.subscribe("b", "C", tx, 0).await.expect("subscribe");

    let listing = broker.list().await;
    assert_eq!(listing.len(), 2);
    assert_eq!(listing[0].name, "a");
    assert_eq!(listing[0].subscribers, 0);
    assert_eq!(listing[1].name, "b");
    assert_eq!(listing[1].subscribers, 1);
}

#[tokio::test]
async fn shutdown_notifies_drains_and_quiesces() {
    let broker = Broker::new(BrokerSettings::default());
    broker.create_topic("t").await.expect("create");
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (sub, _) = broker.subscribe("t", "C", tx, 0).await.expect("subscribe");

    broker.shutdown(Duration::from_millis(10)).await;

    match recv_frame(&mut rx).await {
        ServerFrame::Info { topic, msg, .. } => {
            assert_eq!(topic.as_deref(), Some("t"));
            assert_eq!(msg, INFO_SERVER_SHUTDOWN);
        }
        other => panic!("expected info, got {other:?}"),
    }
    recv_close(&mut rx).await;
    assert!(!sub.is_active());

    assert_eq!(
        broker.create_topic("u").await.expect_err("create"),
        BrokerError::ShuttingDown
    );
    assert_eq!(
        broker.publish("t", message(json!({}))).await.expect_err("publish"),
        BrokerError::ShuttingDown
    );
    let (tx_two, _rx_two) = mpsc::unbounded_channel();
    assert_eq!(
        broker
            .subscribe("t", "D", tx_two, 0)
            .await
            .expect_err("subscribe"),
        BrokerError::ShuttingDown
    );
}

#[tokio::test]
async fn disconnect_policy_drops_the_slow_consumer() {
    let settings = BrokerSettings {
        max_subscriber_queue_size: 1,
        overflow_policy: OverflowPolicy::Disconnect,
        ..BrokerSettings::default()
    };
    let broker = Broker::new(settings);
    broker.create_topic("t").await.expect("create");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let (sub, _) = broker.subscribe("t", "D", tx, 0).await.expect("subscribe");

    assert_eq!(
        broker.publish("t", message(json!({"i": 1}))).await.expect("first"),
        1
    );
    // Queue is now full and nothing is draining it.
    assert_eq!(
        broker.publish("t", message(json!({"i": 2}))).await.expect("second"),
        0
    );

    match recv_frame(&mut rx).await {
        ServerFrame::Error { error, .. } => assert_eq!(error.code, ErrorCode::SlowConsumer),
        other => panic!("expected error, got {other:?}"),
    }
    recv_close(&mut rx).await;
    assert!(!sub.is_active());
    assert_eq!(broker.stats().await["t"].subscribers, 0);
}

#[tokio::test]
async fn pump_stops_and_deactivates_on_emit_failure() {
    let (tx, rx) = mpsc::unbounded_channel();
    drop(rx);
    let subscriber = Arc::new(Subscriber::new(
        "gone",
        tx,
        4,
        OverflowPolicy::DropOldest,
    ));
    let accepted = subscriber.enqueue(DeliveryFrame {
        topic: "t".to_string(),
        message: message(json!({})),
        ts: chrono::Utc::now(),
    });
    assert_eq!(accepted, EnqueueResult::Delivered);

    run_delivery_pump(Arc::clone(&subscriber)).await;
    assert!(!subscriber.is_active());
}

#[tokio::test]
async fn deactivated_subscriber_rejects_enqueue_but_drains() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let subscriber = Subscriber::new("c", tx, 4, OverflowPolicy::DropOldest);
    let frame = DeliveryFrame {
        topic: "t".to_string(),
        message: message(json!({"i": 1})),
        ts: chrono::Utc::now(),
    };
    assert_eq!(subscriber.enqueue(frame.clone()), EnqueueResult::Delivered);

    subscriber.deactivate();
    assert_eq!(subscriber.enqueue(frame), EnqueueResult::Rejected);
    // Already-queued frames still drain, then the stream ends.
    assert!(subscriber.next().await.is_some());
    assert!(subscriber.next().await.is_none());
}
