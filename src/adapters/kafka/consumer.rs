//! Kafka consumer-group adapter for the observation log.
//!
//! Offsets are stored explicitly after each processed message
//! (`enable.auto.offset.store=false`) and flushed by the auto-commit timer,
//! so a position only advances once its observation is persisted.

use async_trait::async_trait;
use rdkafka::config::{ClientConfig, RDKafkaLogLevel};
use rdkafka::consumer::{BaseConsumer, CommitMode, Consumer, ConsumerContext, Rebalance, StreamConsumer};
use rdkafka::error::KafkaResult;
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::topic_partition_list::{Offset, TopicPartitionList};
use rdkafka::ClientContext;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::domain::errors::DomainResult;
use crate::domain::models::ConsumerConfig;
use crate::domain::ports::{LogEvent, LogMessage, ObservationLog, PartitionClaim};

/// Stored positions are committed before the member gives up its claims.
const LEAVE_COMMIT_MODE: CommitMode = CommitMode::Sync;

/// Forwards group rebalance callbacks into the async event stream.
pub struct GroupContext {
    rebalances: mpsc::UnboundedSender<LogEvent>,
}

impl ClientContext for GroupContext {}

impl ConsumerContext for GroupContext {
    fn pre_rebalance(&self, _consumer: &BaseConsumer<Self>, rebalance: &Rebalance<'_>) {
        if let Rebalance::Revoke(partitions) = rebalance {
            let claims = claims_from(partitions);
            info!(partitions = ?claims, "partitions revoked");
            let _ = self.rebalances.send(LogEvent::Revoked(claims));
        }
    }

    fn post_rebalance(&self, _consumer: &BaseConsumer<Self>, rebalance: &Rebalance<'_>) {
        match rebalance {
            Rebalance::Assign(partitions) => {
                let claims = claims_from(partitions);
                info!(partitions = ?claims, "partitions assigned");
                let _ = self.rebalances.send(LogEvent::Assigned(claims));
            }
            Rebalance::Error(err) => warn!(error = %err, "rebalance failed"),
            Rebalance::Revoke(_) => {}
        }
    }

    fn commit_callback(&self, result: KafkaResult<()>, offsets: &TopicPartitionList) {
        match result {
            Ok(()) => debug!(count = offsets.count(), "offsets committed"),
            Err(err) => warn!(error = %err, "offset commit failed"),
        }
    }
}

fn claims_from(partitions: &TopicPartitionList) -> Vec<PartitionClaim> {
    partitions
        .elements()
        .iter()
        .map(|elem| PartitionClaim::new(elem.topic(), elem.partition()))
        .collect()
}

fn to_log_message(message: &BorrowedMessage<'_>) -> LogMessage {
    LogMessage {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        payload: message.payload().map(<[u8]>::to_vec),
    }
}

/// Client settings for a group member.
pub fn client_config(config: &ConsumerConfig, client_id: &str) -> ClientConfig {
    let mut client = ClientConfig::new();
    client
        .set("bootstrap.servers", &config.brokers)
        .set("group.id", &config.group)
        .set("client.id", client_id)
        .set("partition.assignment.strategy", "roundrobin")
        .set("auto.offset.reset", config.offset_reset.as_str())
        .set("enable.auto.commit", "true")
        .set("enable.auto.offset.store", "false")
        .set_log_level(RDKafkaLogLevel::Warning);
    client
}

/// Consumer-group member backed by librdkafka.
pub struct KafkaObservationLog {
    consumer: StreamConsumer<GroupContext>,
    rebalances: mpsc::UnboundedReceiver<LogEvent>,
    /// Message fetched in the same poll that produced a rebalance event.
    pending: Option<LogMessage>,
    topic: String,
}

impl KafkaObservationLog {
    /// Create the consumer and subscribe to the configured topic.
    ///
    /// Joining the group happens asynchronously; the first
    /// [`LogEvent::Assigned`] marks its completion.
    pub fn connect(config: &ConsumerConfig, client_id: &str) -> DomainResult<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let consumer: StreamConsumer<GroupContext> =
            client_config(config, client_id).create_with_context(GroupContext { rebalances: tx })?;
        consumer.subscribe(&[config.topic.as_str()])?;

        info!(
            brokers = %config.brokers,
            topic = %config.topic,
            group = %config.group,
            "subscribed to topic"
        );

        Ok(Self {
            consumer,
            rebalances: rx,
            pending: None,
            topic: config.topic.clone(),
        })
    }

    /// Drop a stashed message whose partition was just revoked; the next
    /// owner will receive it again.
    fn track(&mut self, event: LogEvent) -> LogEvent {
        if let (LogEvent::Revoked(claims), Some(message)) = (&event, &self.pending) {
            let revoked = claims
                .iter()
                .any(|c| c.topic == message.topic && c.partition == message.partition);
            if revoked {
                debug!(
                    partition = message.partition,
                    offset = message.offset,
                    "dropping message from revoked partition"
                );
                self.pending = None;
            }
        }
        event
    }
}

#[async_trait]
impl ObservationLog for KafkaObservationLog {
    async fn next_event(&mut self) -> DomainResult<LogEvent> {
        if let Ok(event) = self.rebalances.try_recv() {
            return Ok(self.track(event));
        }
        if let Some(message) = self.pending.take() {
            return Ok(LogEvent::Message(message));
        }

        let message = tokio::select! {
            biased;
            Some(event) = self.rebalances.recv() => return Ok(self.track(event)),
            delivered = self.consumer.recv() => to_log_message(&delivered?),
        };

        // The poll that fetched this message may also have run a rebalance.
        if let Ok(event) = self.rebalances.try_recv() {
            self.pending = Some(message);
            return Ok(self.track(event));
        }
        Ok(LogEvent::Message(message))
    }

    async fn mark_processed(&mut self, message: &LogMessage) -> DomainResult<()> {
        let mut offsets = TopicPartitionList::new();
        offsets.add_partition_offset(&message.topic, message.partition, Offset::Offset(message.offset + 1))?;
        self.consumer.store_offsets(&offsets)?;
        Ok(())
    }

    async fn leave(&mut self) -> DomainResult<()> {
        if let Err(err) = self.consumer.commit_consumer_state(LEAVE_COMMIT_MODE) {
            debug!(error = %err, "no stored offsets to commit on leave");
        }
        self.consumer.unsubscribe();
        info!(topic = %self.topic, "left consumer group");
        Ok(())
    }
}
