//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::commands::config::ConfigArgs;
use super::commands::get::GetArgs;
use super::commands::serve::ServeArgs;

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "tally - running sums over a partitioned log", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file (defaults to ./tally.yaml when present)
    #[arg(short, long, global = true, env = "TALLY_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Join the consumer group and serve the read API
    Serve(ServeArgs),

    /// Read one aggregate directly from the store
    Get(GetArgs),

    /// Print the effective configuration
    Config(ConfigArgs),
}
