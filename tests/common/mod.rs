//! Common test utilities for integration tests
//!
//! Provides shared fixtures and helpers used across multiple integration
//! test files.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tally::adapters::sqlite::{PoolConfig, SqliteAggregateStore};
use tally::services::{AccumulatorService, ConflictRetry};
use tempfile::TempDir;

pub type Service = Arc<AccumulatorService<SqliteAggregateStore>>;

/// Create a temporary directory for test isolation
///
/// Returns a TempDir that will be cleaned up when dropped.
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Open a store in `dir` and wrap it in a shared service.
pub async fn open_service(dir: &Path) -> Service {
    let store = SqliteAggregateStore::open(dir, &PoolConfig::default())
        .await
        .expect("Failed to open store");
    Arc::new(AccumulatorService::new(store, ConflictRetry::default()))
}

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Poll an async condition every 10ms until it holds or `timeout` expires.
pub async fn wait_until<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(timeout, async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}

/// GET `path` on the read API and decode the JSON envelope.
pub async fn try_http_get(addr: SocketAddr, path: &str) -> reqwest::Result<(u16, serde_json::Value)> {
    let response = reqwest::get(format!("http://{addr}{path}")).await?;
    let status = response.status().as_u16();
    Ok((status, response.json().await?))
}

pub async fn http_get(addr: SocketAddr, path: &str) -> (u16, serde_json::Value) {
    try_http_get(addr, path)
        .await
        .expect("Request to read API failed")
}
