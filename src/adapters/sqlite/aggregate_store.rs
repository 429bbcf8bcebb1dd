//! SQLite implementation of the AggregateStore.
//!
//! Writable transactions start with `BEGIN IMMEDIATE`, which takes the
//! database write lock up front. A second writer waits on the busy timeout
//! instead of failing late at commit, so read-modify-write sequences on the
//! same key cannot interleave. Read-only transactions use a deferred `BEGIN`
//! and, in WAL mode, read a stable snapshot without blocking writers.

use async_trait::async_trait;
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::path::{Path, PathBuf};

use super::connection::{create_pool, PoolConfig};
use super::migrations::{all_embedded_migrations, Migrator};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{AggregateStore, StoreTransaction};

#[derive(Clone)]
pub struct SqliteAggregateStore {
    pool: SqlitePool,
    dir: PathBuf,
}

impl SqliteAggregateStore {
    /// Open or create the store in `dir` and bring its schema up to date.
    pub async fn open(dir: impl AsRef<Path>, config: &PoolConfig) -> DomainResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        let pool = create_pool(&dir, config).await?;

        let migrator = Migrator::new(pool.clone());
        if let Err(err) = migrator.run_embedded_migrations(all_embedded_migrations()).await {
            pool.close().await;
            return Err(err.into());
        }

        tracing::info!(dir = %dir.display(), "aggregate store opened");
        Ok(Self { pool, dir })
    }
}

#[async_trait]
impl AggregateStore for SqliteAggregateStore {
    type Txn = SqliteStoreTransaction;

    async fn begin_transaction(&self, writable: bool) -> DomainResult<Self::Txn> {
        let tx = if writable {
            self.pool.begin_with("BEGIN IMMEDIATE").await?
        } else {
            self.pool.begin().await?
        };
        Ok(SqliteStoreTransaction { tx, writable })
    }

    async fn close(&self) {
        if self.pool.is_closed() {
            return;
        }
        self.pool.close().await;
        tracing::info!(dir = %self.dir.display(), "aggregate store closed");
    }

    fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

/// Transaction handle; rolled back on drop unless committed.
pub struct SqliteStoreTransaction {
    tx: Transaction<'static, Sqlite>,
    writable: bool,
}

#[async_trait]
impl StoreTransaction for SqliteStoreTransaction {
    async fn get(&mut self, key: &[u8]) -> DomainResult<Option<Vec<u8>>> {
        let value = sqlx::query_scalar::<_, Vec<u8>>("SELECT value FROM aggregates WHERE key = ?")
            .bind(key)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(value)
    }

    async fn set(&mut self, key: &[u8], value: &[u8]) -> DomainResult<()> {
        if !self.writable {
            return Err(DomainError::ValidationFailed(
                "cannot write in a read-only transaction".to_string(),
            ));
        }

        sqlx::query(
            "INSERT INTO aggregates (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self) -> DomainResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn discard(self) {
        if let Err(err) = self.tx.rollback().await {
            tracing::warn!(error = %err, "failed to roll back store transaction");
        }
    }
}
