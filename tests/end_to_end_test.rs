//! End-to-end: log messages in, HTTP reads out.

mod common;

use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tally::adapters::memory::{InMemoryObservationLog, LogFeed};
use tally::application::{IngestRuntime, RuntimeError, RuntimeReport};
use tally::domain::ports::AggregateStore;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

struct Harness {
    feed: LogFeed,
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<Result<RuntimeReport, RuntimeError>>,
    service: common::Service,
}

async fn start(service: common::Service, join_timeout: Duration) -> Harness {
    let (log, feed) = InMemoryObservationLog::new("user_details_1");
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();

    let runtime = IngestRuntime::new(Arc::clone(&service), "tally-e2e", join_timeout);
    let handle = tokio::spawn(runtime.run(log, listener, async move {
        let _ = stopped.await;
    }));

    Harness {
        feed,
        addr,
        stop,
        handle,
        service,
    }
}

async fn wait_for_marks(feed: &LogFeed, count: usize) {
    let reached = common::wait_until(Duration::from_secs(5), || async {
        feed.marked().await.len() >= count
    })
    .await;
    assert!(reached, "expected {count} marked messages");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sum_is_served_over_http() {
    common::setup_test_logging();
    let dir = common::temp_dir();
    let harness = start(common::open_service(dir.path()).await, Duration::from_secs(5)).await;

    harness.feed.assign(&[0, 1]);
    harness.feed.publish_json(0, &json!({"id": "42", "value": 10.5})).await;
    harness.feed.publish_json(1, &json!({"id": "42", "value": 5.25})).await;
    wait_for_marks(&harness.feed, 2).await;

    let (status, body) = common::http_get(harness.addr, "/getValueForId?id=42").await;
    assert_eq!(status, 200);
    assert_eq!(
        body,
        json!({
            "status": "Success",
            "message": "Data fetched successfully.",
            "data": {"id": "42", "value": 15.75}
        })
    );

    let (status, body) = common::http_get(harness.addr, "/getValueForId?id=99").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "Failure");
    assert_eq!(body["message"], "Key not found: 99");
    assert!(body["data"].is_null());

    let (_, health) = common::http_get(harness.addr, "/health").await;
    assert_eq!(health["service"], "tally-e2e");

    harness.stop.send(()).unwrap();
    let report = harness.handle.await.unwrap().unwrap();
    assert_eq!(report.sessions, 1);
    assert!(harness.feed.has_left().await);
    assert!(harness.service.store().is_closed());

    // The listener is gone once the runtime has returned.
    assert!(common::try_http_get(harness.addr, "/health").await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_malformed_messages_do_not_stop_ingestion() {
    let dir = common::temp_dir();
    let harness = start(common::open_service(dir.path()).await, Duration::from_secs(5)).await;

    harness.feed.assign(&[0]);
    harness.feed.publish(0, Some(b"{not json".to_vec())).await;
    harness.feed.publish_json(0, &json!({"value": 3.0})).await;
    harness.feed.publish_json(0, &json!({"id": "7", "value": 3.0})).await;
    wait_for_marks(&harness.feed, 3).await;

    let (_, body) = common::http_get(harness.addr, "/getValueForId?id=7").await;
    assert_eq!(body["data"]["value"], 3.0);

    harness.stop.send(()).unwrap();
    harness.handle.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rebalance_starts_new_session() {
    let dir = common::temp_dir();
    let harness = start(common::open_service(dir.path()).await, Duration::from_secs(5)).await;

    harness.feed.assign(&[0, 1]);
    harness.feed.publish_json(0, &json!({"id": "r", "value": 1.0})).await;
    wait_for_marks(&harness.feed, 1).await;

    harness.feed.revoke(&[0, 1]);
    harness.feed.assign(&[1]);
    harness.feed.publish_json(1, &json!({"id": "r", "value": 2.0})).await;
    wait_for_marks(&harness.feed, 2).await;

    let (_, body) = common::http_get(harness.addr, "/getValueForId?id=r").await;
    assert_eq!(body["data"]["value"], 3.0);

    harness.stop.send(()).unwrap();
    let report = harness.handle.await.unwrap().unwrap();
    assert_eq!(report.sessions, 2);
}

#[tokio::test]
async fn test_join_timeout_is_fatal() {
    let dir = common::temp_dir();
    let harness = start(common::open_service(dir.path()).await, Duration::from_millis(100)).await;

    let result = harness.handle.await.unwrap();
    assert!(matches!(result, Err(RuntimeError::JoinTimeout(_))));
    assert!(harness.feed.has_left().await);
    assert!(harness.service.store().is_closed());
}

#[tokio::test]
async fn test_storage_failure_stops_runtime_with_error() {
    let dir = common::temp_dir();
    let harness = start(common::open_service(dir.path()).await, Duration::from_secs(5)).await;

    harness.feed.assign(&[0]);
    // Closing the store underneath the member makes the next write fail.
    let reached = common::wait_until(Duration::from_secs(5), || async {
        matches!(common::try_http_get(harness.addr, "/health").await, Ok((200, _)))
    })
    .await;
    assert!(reached, "read API should come up after joining");
    harness.service.close().await;
    harness.feed.publish_json(0, &json!({"id": "lost", "value": 1.0})).await;

    let result = tokio::time::timeout(Duration::from_secs(5), harness.handle)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(RuntimeError::MemberFailed(_))));
    assert!(harness.feed.marked().await.is_empty());
    assert!(harness.feed.has_left().await);
}
