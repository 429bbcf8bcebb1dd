//! Kafka adapters.

pub mod consumer;

pub use consumer::{client_config, GroupContext, KafkaObservationLog};
