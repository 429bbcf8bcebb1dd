//! Implementation of the `tally get` command.

use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};

use crate::adapters::sqlite::{PoolConfig, SqliteAggregateStore};
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Observation;
use crate::infrastructure::config::ConfigLoader;
use crate::services::{AccumulatorService, ConflictRetry};

#[derive(Args, Debug)]
pub struct GetArgs {
    /// Aggregate key
    pub id: String,

    /// Override the store directory
    #[arg(long)]
    pub store_dir: Option<PathBuf>,
}

#[derive(Debug, serde::Serialize)]
pub struct GetOutput {
    #[serde(flatten)]
    pub record: Observation,
}

impl CommandOutput for GetOutput {
    fn to_human(&self) -> String {
        format!("{} = {:.2}", self.record.id, self.record.value)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: GetArgs, config_path: Option<&Path>, json_mode: bool) -> Result<()> {
    let config = ConfigLoader::load(config_path)?;
    let dir = args
        .store_dir
        .unwrap_or_else(|| PathBuf::from(&config.store.dir));

    let store = SqliteAggregateStore::open(&dir, &PoolConfig::from(&config.store))
        .await
        .with_context(|| format!("Failed to open store at {}", dir.display()))?;
    let service = AccumulatorService::new(store, ConflictRetry::from(&config.accumulator));

    let result = service.read(&args.id).await;
    service.close().await;
    let record = result?;

    output(&GetOutput { record }, json_mode);
    Ok(())
}
