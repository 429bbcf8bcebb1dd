//! SQLite adapters for the tally aggregate store.

pub mod aggregate_store;
pub mod connection;
pub mod migrations;

pub use aggregate_store::{SqliteAggregateStore, SqliteStoreTransaction};
pub use connection::{create_pool, ConnectionError, PoolConfig, DATABASE_FILE};
pub use migrations::{all_embedded_migrations, Migration, MigrationError, Migrator};

use std::time::Duration;

use crate::domain::models::StoreConfig;

impl From<&StoreConfig> for PoolConfig {
    fn from(config: &StoreConfig) -> Self {
        Self {
            max_connections: config.max_connections,
            min_connections: 1,
            busy_timeout: Duration::from_secs(config.busy_timeout_secs),
        }
    }
}
