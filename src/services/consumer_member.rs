//! Consumer-group member.
//!
//! Pulls observations from a partitioned log one message at a time and folds
//! them into the aggregate store. A position is marked for commit only after
//! its observation is persisted, or when the message is dropped as malformed.
//!
//! State flows `Joining -> Ready -> Consuming`, through
//! `Rebalancing -> Ready -> Consuming` on every rebalance, and ends in
//! `ShuttingDown -> Stopped`. Each `Ready` starts a new assignment session;
//! the session counter on [`MemberStatus`] is the readiness signal.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::errors::DomainResult;
use crate::domain::models::Observation;
use crate::domain::ports::{AggregateStore, LogEvent, LogMessage, ObservationLog};
use crate::services::accumulator::AccumulatorService;

/// Pause after a log client error before polling again.
const DEFAULT_ERROR_PAUSE: Duration = Duration::from_secs(1);

/// Lifecycle state of the member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberState {
    Joining,
    Ready,
    Consuming,
    Rebalancing,
    ShuttingDown,
    Stopped,
}

/// Snapshot published on every state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberStatus {
    pub state: MemberState,
    /// Number of assignment sessions started so far.
    pub session: u64,
}

impl MemberStatus {
    /// Whether the member has been assigned partitions at least once.
    pub const fn has_joined(&self) -> bool {
        self.session > 0
    }
}

pub struct ConsumerMember<S: AggregateStore> {
    service: Arc<AccumulatorService<S>>,
    status: watch::Sender<MemberStatus>,
    error_pause: Duration,
}

impl<S: AggregateStore> ConsumerMember<S> {
    pub fn new(service: Arc<AccumulatorService<S>>) -> Self {
        let (status, _) = watch::channel(MemberStatus {
            state: MemberState::Joining,
            session: 0,
        });
        Self {
            service,
            status,
            error_pause: DEFAULT_ERROR_PAUSE,
        }
    }

    /// Override the pause after a log client error.
    pub fn with_error_pause(mut self, pause: Duration) -> Self {
        self.error_pause = pause;
        self
    }

    /// Watch state changes and assignment sessions.
    pub fn subscribe(&self) -> watch::Receiver<MemberStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> MemberStatus {
        *self.status.borrow()
    }

    fn set_state(&self, state: MemberState) {
        self.status.send_modify(|status| status.state = state);
    }

    fn begin_session(&self) -> u64 {
        let mut session = 0;
        self.status.send_modify(|status| {
            status.session += 1;
            status.state = MemberState::Ready;
            session = status.session;
        });
        session
    }

    /// Run until `cancel` fires or a fatal error occurs, then leave the group.
    ///
    /// Returns the fatal error, if any, after the member has stopped.
    pub async fn run<L: ObservationLog>(&self, mut log: L, cancel: CancellationToken) -> DomainResult<()> {
        self.set_state(MemberState::Joining);
        info!("joining consumer group");

        let outcome = self.consume(&mut log, &cancel).await;

        self.set_state(MemberState::ShuttingDown);
        if let Err(err) = log.leave().await {
            warn!(error = %err, "failed to leave consumer group cleanly");
        }
        self.set_state(MemberState::Stopped);

        match &outcome {
            Ok(()) => info!("consumer member stopped"),
            Err(err) => error!(error = %err, "consumer member halted"),
        }
        outcome
    }

    async fn consume<L: ObservationLog>(&self, log: &mut L, cancel: &CancellationToken) -> DomainResult<()> {
        loop {
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!("shutdown requested, no longer pulling messages");
                    return Ok(());
                }
                event = log.next_event() => event,
            };

            match event {
                Ok(LogEvent::Assigned(claims)) => {
                    let session = self.begin_session();
                    info!(session, partitions = claims.len(), "assignment session started");
                    self.set_state(MemberState::Consuming);
                }
                Ok(LogEvent::Revoked(claims)) => {
                    info!(partitions = claims.len(), "rebalancing");
                    self.set_state(MemberState::Rebalancing);
                }
                Ok(LogEvent::Message(message)) => self.process(log, &message).await?,
                Err(err) => {
                    warn!(error = %err, "log client error");
                    tokio::select! {
                        () = cancel.cancelled() => return Ok(()),
                        () = tokio::time::sleep(self.error_pause) => {}
                    }
                }
            }
        }
    }

    async fn process<L: ObservationLog>(&self, log: &mut L, message: &LogMessage) -> DomainResult<()> {
        let Some(payload) = message.payload.as_deref() else {
            error!(
                partition = message.partition,
                offset = message.offset,
                "message without payload dropped"
            );
            self.mark(log, message).await;
            return Ok(());
        };

        let observation = match Observation::from_payload(payload) {
            Ok(observation) => observation,
            Err(err) => {
                error!(
                    partition = message.partition,
                    offset = message.offset,
                    error = %err,
                    "malformed observation dropped"
                );
                self.mark(log, message).await;
                return Ok(());
            }
        };

        match self.service.accumulate(&observation.id, observation.value).await {
            Ok(sum) => {
                debug!(
                    id = %observation.id,
                    value = observation.value,
                    sum,
                    partition = message.partition,
                    offset = message.offset,
                    "observation applied"
                );
                self.mark(log, message).await;
                Ok(())
            }
            Err(err) if err.is_fatal_for_ingestion() => {
                error!(
                    id = %observation.id,
                    partition = message.partition,
                    offset = message.offset,
                    error = %err,
                    "observation could not be persisted"
                );
                Err(err)
            }
            Err(err) => {
                error!(id = %observation.id, error = %err, "observation rejected");
                self.mark(log, message).await;
                Ok(())
            }
        }
    }

    async fn mark<L: ObservationLog>(&self, log: &mut L, message: &LogMessage) {
        if let Err(err) = log.mark_processed(message).await {
            warn!(
                partition = message.partition,
                offset = message.offset,
                error = %err,
                "failed to mark message processed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryObservationLog, LogFeed};
    use crate::adapters::sqlite::{PoolConfig, SqliteAggregateStore};
    use crate::domain::errors::DomainError;
    use crate::services::accumulator::ConflictRetry;
    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::TempDir;
    use tokio::sync::Notify;
    use tokio::task::JoinHandle;

    type Service = Arc<AccumulatorService<SqliteAggregateStore>>;

    async fn service(dir: &TempDir) -> Service {
        let store = SqliteAggregateStore::open(dir.path(), &PoolConfig::default())
            .await
            .unwrap();
        Arc::new(AccumulatorService::new(store, ConflictRetry::default()))
    }

    struct Running {
        feed: LogFeed,
        status: watch::Receiver<MemberStatus>,
        cancel: CancellationToken,
        handle: JoinHandle<DomainResult<()>>,
    }

    /// Store whose writable transactions wait until the gate is opened.
    struct GatedStore {
        inner: SqliteAggregateStore,
        entered: Arc<Notify>,
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl AggregateStore for GatedStore {
        type Txn = <SqliteAggregateStore as AggregateStore>::Txn;

        async fn begin_transaction(&self, writable: bool) -> DomainResult<Self::Txn> {
            if writable {
                self.entered.notify_one();
                self.gate.notified().await;
            }
            self.inner.begin_transaction(writable).await
        }

        async fn close(&self) {
            self.inner.close().await;
        }

        fn is_closed(&self) -> bool {
            self.inner.is_closed()
        }
    }

    fn start<S: AggregateStore + 'static>(service: Arc<AccumulatorService<S>>) -> Running {
        let (log, feed) = InMemoryObservationLog::new("user_details_1");
        let member = ConsumerMember::new(service).with_error_pause(Duration::from_millis(10));
        let status = member.subscribe();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move { member.run(log, token).await });
        Running {
            feed,
            status,
            cancel,
            handle,
        }
    }

    async fn wait_for_marks(feed: &LogFeed, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while feed.marked().await.len() < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("messages were not marked in time");
    }

    #[tokio::test]
    async fn test_accumulates_and_marks_each_message() {
        let temp_dir = TempDir::new().unwrap();
        let svc = service(&temp_dir).await;
        let running = start(Arc::clone(&svc));

        running.feed.assign(&[0]);
        running.feed.publish_json(0, &json!({"id": "42", "value": 10.5})).await;
        running.feed.publish_json(0, &json!({"id": "42", "value": 5.25})).await;
        wait_for_marks(&running.feed, 2).await;

        let record = svc.read("42").await.unwrap();
        assert!((record.value - 15.75).abs() < f64::EPSILON);

        let offsets: Vec<i64> = running.feed.marked().await.iter().map(|m| m.offset).collect();
        assert_eq!(offsets, vec![0, 1]);

        running.cancel.cancel();
        running.handle.await.unwrap().unwrap();
        assert!(running.feed.has_left().await);
        assert_eq!(running.status.borrow().state, MemberState::Stopped);
    }

    #[tokio::test]
    async fn test_readiness_once_per_assignment_session() {
        let temp_dir = TempDir::new().unwrap();
        let mut running = start(service(&temp_dir).await);

        assert!(!running.status.borrow().has_joined());

        running.feed.assign(&[0, 1]);
        let status = *running
            .status
            .wait_for(|s| s.state == MemberState::Consuming)
            .await
            .unwrap();
        assert_eq!(status.session, 1);

        running.feed.revoke(&[0, 1]);
        let status = *running
            .status
            .wait_for(|s| s.state == MemberState::Rebalancing)
            .await
            .unwrap();
        assert_eq!(status.session, 1);

        running.feed.assign(&[1]);
        let status = *running
            .status
            .wait_for(|s| s.state == MemberState::Consuming)
            .await
            .unwrap();
        assert_eq!(status.session, 2);

        running.cancel.cancel();
        running.handle.await.unwrap().unwrap();
        assert_eq!(running.status.borrow().session, 2);
    }

    #[tokio::test]
    async fn test_malformed_payloads_are_dropped_and_marked() {
        let temp_dir = TempDir::new().unwrap();
        let svc = service(&temp_dir).await;
        let running = start(Arc::clone(&svc));

        running.feed.assign(&[0]);
        running.feed.publish(0, Some(b"not json".to_vec())).await;
        running.feed.publish(0, None).await;
        running.feed.publish_json(0, &json!({"id": "a"})).await;
        running.feed.publish_json(0, &json!({"id": "b", "value": 1.0, "extra": true})).await;
        running.feed.publish_json(0, &json!({"id": "", "value": 1.0})).await;
        running.feed.publish_json(0, &json!({"id": "ok", "value": 1.0})).await;
        wait_for_marks(&running.feed, 6).await;

        for id in ["a", "b"] {
            assert!(matches!(svc.read(id).await, Err(DomainError::NotFound(_))));
        }
        assert!((svc.read("ok").await.unwrap().value - 1.0).abs() < f64::EPSILON);

        running.cancel.cancel();
        running.handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_storage_failure_halts_without_marking() {
        let temp_dir = TempDir::new().unwrap();
        let svc = service(&temp_dir).await;
        svc.close().await;
        let running = start(svc);

        running.feed.assign(&[0]);
        running.feed.publish_json(0, &json!({"id": "42", "value": 1.0})).await;

        let result = tokio::time::timeout(Duration::from_secs(5), running.handle)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(DomainError::Storage(_))));
        assert!(running.feed.marked().await.is_empty());
        assert!(running.feed.has_left().await);
        assert_eq!(running.status.borrow().state, MemberState::Stopped);
    }

    #[tokio::test]
    async fn test_cancel_before_assignment_leaves_group() {
        let temp_dir = TempDir::new().unwrap();
        let running = start(service(&temp_dir).await);

        running.cancel.cancel();
        running.handle.await.unwrap().unwrap();

        assert!(running.feed.has_left().await);
        let status = *running.status.borrow();
        assert_eq!(status.state, MemberState::Stopped);
        assert!(!status.has_joined());
    }

    #[tokio::test]
    async fn test_mark_failure_is_not_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let svc = service(&temp_dir).await;
        let running = start(Arc::clone(&svc));

        running.feed.fail_marks(true).await;
        running.feed.assign(&[0]);
        running.feed.publish_json(0, &json!({"id": "m", "value": 2.0})).await;
        running.feed.publish_json(0, &json!({"id": "m", "value": 3.0})).await;

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(record) = svc.read("m").await {
                    if (record.value - 5.0).abs() < f64::EPSILON {
                        break;
                    }
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("both observations should be applied");
        assert!(running.feed.marked().await.is_empty());

        running.cancel.cancel();
        running.handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_log_client_error_is_not_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let svc = service(&temp_dir).await;
        let running = start(Arc::clone(&svc));

        running.feed.assign(&[0]);
        running.feed.fail("broker transport failure");
        running.feed.publish_json(0, &json!({"id": "after", "value": 4.5})).await;
        wait_for_marks(&running.feed, 1).await;

        assert!((svc.read("after").await.unwrap().value - 4.5).abs() < f64::EPSILON);

        running.cancel.cancel();
        running.handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_overflowing_observation_is_dropped_and_ingestion_continues() {
        let temp_dir = TempDir::new().unwrap();
        let svc = service(&temp_dir).await;
        let running = start(Arc::clone(&svc));

        running.feed.assign(&[0]);
        running.feed.publish_json(0, &json!({"id": "big", "value": 1e308})).await;
        running.feed.publish_json(0, &json!({"id": "big", "value": 1e308})).await;
        running.feed.publish_json(0, &json!({"id": "other", "value": 1.0})).await;
        wait_for_marks(&running.feed, 3).await;

        assert!(!running.handle.is_finished());
        let offsets: Vec<i64> = running.feed.marked().await.iter().map(|m| m.offset).collect();
        assert_eq!(offsets, vec![0, 1, 2]);
        assert!((svc.read("other").await.unwrap().value - 1.0).abs() < f64::EPSILON);
        assert!((svc.read("big").await.unwrap().value - 1e308).abs() / 1e308 < 1e-12);

        running.cancel.cancel();
        running.handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_cancel_lets_in_flight_message_finish_before_leaving() {
        let temp_dir = TempDir::new().unwrap();
        let inner = SqliteAggregateStore::open(temp_dir.path(), &PoolConfig::default())
            .await
            .unwrap();
        let entered = Arc::new(Notify::new());
        let gate = Arc::new(Notify::new());
        let svc = Arc::new(AccumulatorService::new(
            GatedStore {
                inner,
                entered: Arc::clone(&entered),
                gate: Arc::clone(&gate),
            },
            ConflictRetry::default(),
        ));
        let running = start(Arc::clone(&svc));

        running.feed.assign(&[0]);
        running.feed.publish_json(0, &json!({"id": "inflight", "value": 2.5})).await;
        tokio::time::timeout(Duration::from_secs(5), entered.notified())
            .await
            .expect("accumulate should reach the store");

        running.cancel.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!running.handle.is_finished(), "member must wait for the in-flight write");
        assert!(!running.feed.has_left().await);

        gate.notify_one();
        tokio::time::timeout(Duration::from_secs(5), running.handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        let offsets: Vec<i64> = running.feed.marked().await.iter().map(|m| m.offset).collect();
        assert_eq!(offsets, vec![0]);
        assert!(running.feed.has_left().await);
        assert_eq!(running.status.borrow().state, MemberState::Stopped);
        assert!((svc.read("inflight").await.unwrap().value - 2.5).abs() < f64::EPSILON);
        svc.close().await;
    }
}
