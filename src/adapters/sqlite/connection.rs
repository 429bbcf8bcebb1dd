//! SQLite connection pool management for the aggregate store.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::domain::errors::DomainError;

/// Name of the database file inside the store directory.
pub const DATABASE_FILE: &str = "aggregates.db";

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Failed to create pool: {0}")]
    PoolCreationFailed(#[source] sqlx::Error),
    #[error("Store path is not a usable directory: {0}")]
    InvalidStorePath(PathBuf),
    #[error("Failed to create directory: {0}")]
    DirectoryCreationFailed(#[source] std::io::Error),
}

impl From<ConnectionError> for DomainError {
    fn from(err: ConnectionError) -> Self {
        Self::Storage(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    /// Wait for a free connection; also the SQLite busy timeout for writers.
    pub busy_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 8,
            min_connections: 1,
            busy_timeout: Duration::from_secs(30),
        }
    }
}

/// Open (creating if needed) the store database inside `dir`.
pub async fn create_pool(dir: &Path, config: &PoolConfig) -> Result<SqlitePool, ConnectionError> {
    ensure_store_directory(dir)?;

    let connect_options = SqliteConnectOptions::new()
        .filename(dir.join(DATABASE_FILE))
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full)
        .busy_timeout(config.busy_timeout);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.busy_timeout)
        .connect_with(connect_options)
        .await
        .map_err(ConnectionError::PoolCreationFailed)?;

    Ok(pool)
}

fn ensure_store_directory(dir: &Path) -> Result<(), ConnectionError> {
    if dir.as_os_str().is_empty() {
        return Err(ConnectionError::InvalidStorePath(dir.to_path_buf()));
    }
    if dir.exists() {
        if !dir.is_dir() {
            return Err(ConnectionError::InvalidStorePath(dir.to_path_buf()));
        }
        return Ok(());
    }
    std::fs::create_dir_all(dir).map_err(ConnectionError::DirectoryCreationFailed)
}
