//! Domain layer for tally
//!
//! This module contains the core data types, errors, and port traits.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
