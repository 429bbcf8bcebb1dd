//! Infrastructure adapters for external systems.

pub mod http;
pub mod kafka;
pub mod memory;
pub mod sqlite;
