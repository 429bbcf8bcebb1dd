//! tally - running sums over a partitioned log
//!
//! tally joins a Kafka consumer group, folds keyed numeric observations into
//! per-key running sums held in an embedded transactional store, and serves
//! the current sums over a small HTTP read API.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Observation types, errors and port traits
//! - **Service Layer** (`services`): Accumulation and the consumer-group member
//! - **Application Layer** (`application`): Runs the member and the read API together
//! - **Adapters** (`adapters`): SQLite store, Kafka consumer, HTTP read API
//! - **Infrastructure Layer** (`infrastructure`): Configuration and logging
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tally::adapters::sqlite::{PoolConfig, SqliteAggregateStore};
//! use tally::services::{AccumulatorService, ConflictRetry};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = SqliteAggregateStore::open(".tally/store", &PoolConfig::default()).await?;
//!     let service = Arc::new(AccumulatorService::new(store, ConflictRetry::default()));
//!     service.accumulate("42", 10.5).await?;
//!     println!("{:?}", service.read("42").await?);
//!     service.close().await;
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use application::{IngestRuntime, RuntimeError, RuntimeReport};
pub use domain::models::{
    AccumulatorConfig, Config, ConsumerConfig, HttpConfig, LogFormat, LoggingConfig, Observation,
    OffsetReset, RotationPolicy, StoreConfig,
};
pub use domain::ports::{AggregateReader, AggregateStore, ObservationLog, StoreTransaction};
pub use domain::{DomainError, DomainResult};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{AccumulatorService, ConflictRetry, ConsumerMember, MemberState, MemberStatus};
