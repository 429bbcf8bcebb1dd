//! In-process adapters used to drive the services without external systems.

pub mod observation_log;

pub use observation_log::{InMemoryObservationLog, LogFeed};
