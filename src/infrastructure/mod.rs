//! Infrastructure layer module
//!
//! Process-level concerns shared by every command:
//! - Configuration management
//! - Logging infrastructure

pub mod config;
pub mod logging;
