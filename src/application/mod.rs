//! Application layer wiring services and adapters into a running process.

pub mod ingest_runtime;

pub use ingest_runtime::{IngestRuntime, RuntimeError, RuntimeReport};
