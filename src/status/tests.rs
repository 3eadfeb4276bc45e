use super::{DeliveryStats, StatusReporter};
use crate::connection::{ConnectionState, SharedState};
use crate::queue::OfflineQueue;
use crate::test_support::reading_at;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::Ordering;

fn reporter(queue: Arc<OfflineQueue>, state: SharedState) -> StatusReporter {
    StatusReporter::new(
        state,
        "localhost:1883",
        "sensor_device_1",
        queue,
        Arc::new(DeliveryStats::default()),
    )
}

#[test]
fn test_status_reflects_live_queue_length() {
    let queue = Arc::new(OfflineQueue::new(10));
    let reporter = reporter(queue.clone(), SharedState::new());

    assert_eq!(reporter.status().queue_size, 0);
    queue.enqueue(reading_at("t1"));
    queue.enqueue(reading_at("t2"));
    assert_eq!(reporter.status().queue_size, 2);
    queue.dequeue_front();
    assert_eq!(reporter.status().queue_size, 1);
}

#[test]
fn test_status_tracks_connection_state() {
    let state = SharedState::new();
    let reporter = reporter(Arc::new(OfflineQueue::new(1)), state.clone());

    let status = reporter.status();
    assert!(!status.connected);
    assert_eq!(status.state, ConnectionState::Disconnected);

    state.set(ConnectionState::Connected);
    let status = reporter.status();
    assert!(status.connected);
    assert_eq!(status.broker, "localhost:1883");
    assert_eq!(status.device_id, "sensor_device_1");
}

#[test]
fn test_status_serializes_to_status_surface() {
    let queue = Arc::new(OfflineQueue::new(1));
    queue.enqueue(reading_at("t1"));
    queue.enqueue(reading_at("t2"));
    let stats = Arc::new(DeliveryStats::default());
    stats.sent.fetch_add(4, Ordering::Relaxed);
    let reporter = StatusReporter::new(
        SharedState::new(),
        "broker.local:9001",
        "greenhouse_2",
        queue,
        stats,
    );

    let value = serde_json::to_value(reporter.status()).unwrap();
    assert_eq!(value["connected"], json!(false));
    assert_eq!(value["state"], json!("disconnected"));
    assert_eq!(value["broker"], json!("broker.local:9001"));
    assert_eq!(value["queue_size"], json!(1));
    assert_eq!(value["device_id"], json!("greenhouse_2"));
    assert_eq!(value["sent"], json!(4));
    assert_eq!(value["evicted"], json!(1));
}
