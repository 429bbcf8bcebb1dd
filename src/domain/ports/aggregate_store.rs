//! Aggregate store port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;

/// Transactional key-value engine holding the running sums.
///
/// Read-only transactions observe a consistent snapshot and never block
/// writers. Writable transactions on the same store are serialized by the
/// engine itself; callers must not add their own locking on top.
#[async_trait]
pub trait AggregateStore: Send + Sync {
    type Txn: StoreTransaction;

    /// Start a scoped transaction.
    async fn begin_transaction(&self, writable: bool) -> DomainResult<Self::Txn>;

    /// Release all underlying resources once in-flight transactions have
    /// finished. Later calls are no-ops.
    async fn close(&self);

    fn is_closed(&self) -> bool;
}

/// A single store transaction.
///
/// Dropping a transaction without committing discards it.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Current committed value for `key`, or `None` when it was never written.
    async fn get(&mut self, key: &[u8]) -> DomainResult<Option<Vec<u8>>>;

    /// Stage a write, visible to other transactions only after commit.
    async fn set(&mut self, key: &[u8], value: &[u8]) -> DomainResult<()>;

    async fn commit(self) -> DomainResult<()>;

    /// Roll back staged writes and release the transaction's lock.
    async fn discard(self);
}
