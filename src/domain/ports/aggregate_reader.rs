//! Read-side port used by request handlers.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::Observation;

/// Looks up the current aggregate for a key.
#[async_trait]
pub trait AggregateReader: Send + Sync {
    /// Returns [`crate::domain::errors::DomainError::NotFound`] for keys that
    /// were never written.
    async fn read(&self, id: &str) -> DomainResult<Observation>;
}
