//! Accumulator service.
//!
//! Folds observations into per-key running sums. The read-modify-write of a
//! single accumulate happens inside one writable store transaction, and the
//! store serializes writers, so concurrent accumulates on the same key never
//! both read the same prior sum. The service adds no locking of its own.

use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{decode_sum, encode_sum, AccumulatorConfig, Observation};
use crate::domain::ports::{AggregateReader, AggregateStore, StoreTransaction};

/// Conflict retry policy.
///
/// Writers normally block on the store's write lock rather than race, so a
/// conflict only surfaces when the lock wait itself times out.
#[derive(Debug, Clone)]
pub struct ConflictRetry {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for ConflictRetry {
    fn default() -> Self {
        Self::from(&AccumulatorConfig::default())
    }
}

impl From<&AccumulatorConfig> for ConflictRetry {
    fn from(config: &AccumulatorConfig) -> Self {
        Self {
            max_attempts: config.max_conflict_retries.max(1),
            initial_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

pub struct AccumulatorService<S: AggregateStore> {
    store: S,
    retry: ConflictRetry,
}

impl<S: AggregateStore> AccumulatorService<S> {
    pub fn new(store: S, retry: ConflictRetry) -> Self {
        Self { store, retry }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Add `value` to the running sum for `id` and return the new sum.
    ///
    /// A missing record counts as zero. A stored value that is not a decimal
    /// fails with [`DomainError::Decode`] and is never retried. An observation
    /// that would overflow the sum is rejected with
    /// [`DomainError::ValidationFailed`] and leaves the record as it was.
    #[instrument(skip(self), level = "debug")]
    pub async fn accumulate(&self, id: &str, value: f64) -> DomainResult<f64> {
        if id.is_empty() {
            return Err(DomainError::ValidationFailed("id must not be empty".to_string()));
        }
        if !value.is_finite() {
            return Err(DomainError::ValidationFailed(format!(
                "value for '{id}' must be finite"
            )));
        }

        let max_attempts = self.retry.max_attempts;
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.retry.initial_backoff)
            .with_max_elapsed_time(None)
            .build();

        let mut attempt = 0u32;
        backoff::future::retry(policy, || {
            attempt += 1;
            let current = attempt;
            async move {
                self.accumulate_once(id, value).await.map_err(|err| {
                    if err.is_retryable() && current < max_attempts {
                        warn!(id, attempt = current, error = %err, "accumulate conflict, retrying");
                        backoff::Error::transient(err)
                    } else {
                        backoff::Error::permanent(err)
                    }
                })
            }
        })
        .await
    }

    async fn accumulate_once(&self, id: &str, value: f64) -> DomainResult<f64> {
        let mut txn = self.store.begin_transaction(true).await?;

        match fold_into(&mut txn, id, value).await {
            Ok(new_sum) => {
                txn.commit().await?;
                debug!(id, value, new_sum, "observation accumulated");
                Ok(new_sum)
            }
            Err(err) => {
                txn.discard().await;
                Err(err)
            }
        }
    }

    /// Current aggregate for `id`.
    ///
    /// A key that was never written is [`DomainError::NotFound`], which is
    /// distinct from a real zero sum.
    pub async fn read(&self, id: &str) -> DomainResult<Observation> {
        if id.is_empty() {
            return Err(DomainError::ValidationFailed("id must not be empty".to_string()));
        }

        let mut txn = self.store.begin_transaction(false).await?;
        let raw = match txn.get(id.as_bytes()).await {
            Ok(raw) => {
                txn.commit().await?;
                raw
            }
            Err(err) => {
                txn.discard().await;
                return Err(err);
            }
        };

        let raw = raw.ok_or_else(|| DomainError::NotFound(id.to_string()))?;
        let value = decode_sum(id, &raw)?;
        Ok(Observation::new(id, value))
    }

    /// Close the underlying store. Waits for in-flight transactions.
    pub async fn close(&self) {
        self.store.close().await;
    }
}

#[async_trait]
impl<S: AggregateStore> AggregateReader for AccumulatorService<S> {
    async fn read(&self, id: &str) -> DomainResult<Observation> {
        Self::read(self, id).await
    }
}

async fn fold_into<T: StoreTransaction>(txn: &mut T, id: &str, value: f64) -> DomainResult<f64> {
    let prior = match txn.get(id.as_bytes()).await? {
        Some(raw) => decode_sum(id, &raw)?,
        None => 0.0,
    };

    let sum = prior + value;
    if !sum.is_finite() {
        return Err(DomainError::ValidationFailed(format!(
            "adding {value} to the sum for '{id}' overflows"
        )));
    }

    let encoded = encode_sum(sum);
    txn.set(id.as_bytes(), &encoded).await?;

    // Report the sum exactly as persisted.
    decode_sum(id, &encoded)
}
