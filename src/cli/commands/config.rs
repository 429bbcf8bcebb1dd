//! Implementation of the `tally config` command.

use anyhow::{Context, Result};
use clap::Args;
use std::path::Path;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;

#[derive(Args, Debug)]
pub struct ConfigArgs {}

#[derive(Debug, serde::Serialize)]
pub struct ConfigOutput {
    #[serde(flatten)]
    pub config: Config,
    #[serde(skip)]
    rendered: String,
}

impl CommandOutput for ConfigOutput {
    fn to_human(&self) -> String {
        self.rendered.trim_end().to_string()
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or_default()
    }
}

pub async fn execute(_args: ConfigArgs, config_path: Option<&Path>, json_mode: bool) -> Result<()> {
    let config = ConfigLoader::load(config_path)?;
    let rendered = serde_yaml::to_string(&config).context("Failed to render configuration")?;
    output(&ConfigOutput { config, rendered }, json_mode);
    Ok(())
}
