//! Partitioned log port.
//!
//! Abstracts the consumer-group client so the ingestion loop can be driven by
//! Kafka in production and by a scripted in-memory log in tests.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;

/// One partition of one topic claimed by this group member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionClaim {
    pub topic: String,
    pub partition: i32,
}

impl PartitionClaim {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

/// A delivered message and its position in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    /// Raw payload; `None` for tombstones.
    pub payload: Option<Vec<u8>>,
}

/// Everything the group coordination protocol can hand to a member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    /// A new set of partitions was claimed; starts an assignment session.
    Assigned(Vec<PartitionClaim>),
    /// Partitions were taken away ahead of a rebalance.
    Revoked(Vec<PartitionClaim>),
    Message(LogMessage),
}

/// A member of a consumer group on a single topic.
#[async_trait]
pub trait ObservationLog: Send {
    /// Wait for the next group event.
    ///
    /// Partition claims are always reported before any message from those
    /// partitions.
    async fn next_event(&mut self) -> DomainResult<LogEvent>;

    /// Record that `message` is fully processed so its position can be
    /// committed.
    async fn mark_processed(&mut self, message: &LogMessage) -> DomainResult<()>;

    /// Commit marked positions and leave the group.
    async fn leave(&mut self) -> DomainResult<()>;
}
