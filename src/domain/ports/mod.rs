//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines async trait interfaces that infrastructure adapters must implement:
//! - AggregateStore: transactional key-value persistence for running sums
//! - AggregateReader: typed lookups for request handlers
//! - ObservationLog: consumer-group membership on a partitioned log

pub mod aggregate_reader;
pub mod aggregate_store;
pub mod observation_log;

pub use aggregate_reader::AggregateReader;
pub use aggregate_store::{AggregateStore, StoreTransaction};
pub use observation_log::{LogEvent, LogMessage, ObservationLog, PartitionClaim};
