//! HTTP adapters.

pub mod read_api;

pub use read_api::{HealthResponse, ReadApiServer, ReadApiState, ReadResponse, ResponseStatus};
