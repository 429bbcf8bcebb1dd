//! Domain errors for the tally ingestion system.

use thiserror::Error;

/// Domain-level errors that can occur while ingesting or serving aggregates.
#[derive(Debug, Error)]
pub enum DomainError {
    /// I/O, open, or commit failure in the aggregate store.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Write contention that outlived the store's lock wait.
    #[error("Transaction conflict: {0}")]
    Conflict(String),

    #[error("Key not found: {0}")]
    NotFound(String),

    /// Malformed inbound payload or malformed stored value.
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Failure reported by the partitioned log client.
    #[error("Log error: {0}")]
    Log(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    /// Whether retrying the whole operation may succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Whether the error means persisted state could not be written or trusted.
    ///
    /// The ingestion loop halts on these instead of advancing its position.
    pub const fn is_fatal_for_ingestion(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Conflict(_) | Self::Decode(_))
    }
}

/// SQLite primary result codes for lock contention.
const SQLITE_BUSY: &str = "5";
const SQLITE_LOCKED: &str = "6";

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let primary = db_err.code().map(|code| {
                // Extended result codes carry the primary code in the low byte.
                code.parse::<i64>()
                    .map(|c| (c & 0xff).to_string())
                    .unwrap_or_else(|_| code.into_owned())
            });
            if matches!(primary.as_deref(), Some(SQLITE_BUSY | SQLITE_LOCKED)) {
                return Self::Conflict(err.to_string());
            }
        }
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<rdkafka::error::KafkaError> for DomainError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        Self::Log(err.to_string())
    }
}
