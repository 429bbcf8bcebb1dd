//! Scripted observation log.
//!
//! A [`LogFeed`] plays the role of the group coordinator and the producers:
//! it hands out partition claims and publishes messages with per-partition
//! offsets. The log side records every position it is asked to mark.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{LogEvent, LogMessage, ObservationLog, PartitionClaim};

#[derive(Debug, Default)]
struct Ledger {
    next_offsets: HashMap<PartitionClaim, i64>,
    marked: Vec<LogMessage>,
    left: bool,
    fail_marks: bool,
}

/// Producer and coordinator handle for an [`InMemoryObservationLog`].
#[derive(Clone)]
pub struct LogFeed {
    topic: String,
    events: mpsc::UnboundedSender<DomainResult<LogEvent>>,
    ledger: Arc<Mutex<Ledger>>,
}

impl LogFeed {
    fn push(&self, event: DomainResult<LogEvent>) {
        // The log side may already be gone; nothing is listening then.
        let _ = self.events.send(event);
    }

    /// Claim `partitions` of the feed's topic for the member.
    pub fn assign(&self, partitions: &[i32]) {
        let claims = partitions
            .iter()
            .map(|p| PartitionClaim::new(&self.topic, *p))
            .collect();
        self.push(Ok(LogEvent::Assigned(claims)));
    }

    /// Take `partitions` away ahead of a rebalance.
    pub fn revoke(&self, partitions: &[i32]) {
        let claims = partitions
            .iter()
            .map(|p| PartitionClaim::new(&self.topic, *p))
            .collect();
        self.push(Ok(LogEvent::Revoked(claims)));
    }

    /// Append a message to `partition` and return its offset.
    pub async fn publish(&self, partition: i32, payload: Option<Vec<u8>>) -> i64 {
        let offset = {
            let mut ledger = self.ledger.lock().await;
            let next = ledger
                .next_offsets
                .entry(PartitionClaim::new(&self.topic, partition))
                .or_insert(0);
            let offset = *next;
            *next += 1;
            offset
        };

        self.push(Ok(LogEvent::Message(LogMessage {
            topic: self.topic.clone(),
            partition,
            offset,
            payload,
        })));
        offset
    }

    /// Publish a JSON observation.
    pub async fn publish_json(&self, partition: i32, payload: &serde_json::Value) -> i64 {
        self.publish(partition, Some(payload.to_string().into_bytes())).await
    }

    /// Deliver a client error to the member.
    pub fn fail(&self, message: impl Into<String>) {
        self.push(Err(DomainError::Log(message.into())));
    }

    /// Make subsequent `mark_processed` calls fail.
    pub async fn fail_marks(&self, fail: bool) {
        self.ledger.lock().await.fail_marks = fail;
    }

    /// Every position marked so far, in marking order.
    pub async fn marked(&self) -> Vec<LogMessage> {
        self.ledger.lock().await.marked.clone()
    }

    /// Whether the member has left the group.
    pub async fn has_left(&self) -> bool {
        self.ledger.lock().await.left
    }
}

/// In-memory [`ObservationLog`] driven by a [`LogFeed`].
///
/// Once every feed handle is dropped and the queued events are drained,
/// `next_event` waits forever, like an idle topic.
pub struct InMemoryObservationLog {
    events: mpsc::UnboundedReceiver<DomainResult<LogEvent>>,
    ledger: Arc<Mutex<Ledger>>,
}

impl InMemoryObservationLog {
    pub fn new(topic: impl Into<String>) -> (Self, LogFeed) {
        let (tx, rx) = mpsc::unbounded_channel();
        let ledger = Arc::new(Mutex::new(Ledger::default()));
        let feed = LogFeed {
            topic: topic.into(),
            events: tx,
            ledger: Arc::clone(&ledger),
        };
        (Self { events: rx, ledger }, feed)
    }
}

#[async_trait]
impl ObservationLog for InMemoryObservationLog {
    async fn next_event(&mut self) -> DomainResult<LogEvent> {
        match self.events.recv().await {
            Some(event) => event,
            None => std::future::pending().await,
        }
    }

    async fn mark_processed(&mut self, message: &LogMessage) -> DomainResult<()> {
        let mut ledger = self.ledger.lock().await;
        if ledger.fail_marks {
            return Err(DomainError::Log(format!(
                "cannot store offset {} for partition {}",
                message.offset, message.partition
            )));
        }
        ledger.marked.push(message.clone());
        Ok(())
    }

    async fn leave(&mut self) -> DomainResult<()> {
        self.ledger.lock().await.left = true;
        Ok(())
    }
}
