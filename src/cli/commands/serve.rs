//! Implementation of the `tally serve` command.

use anyhow::{anyhow, Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::adapters::http::ReadApiServer;
use crate::adapters::kafka::KafkaObservationLog;
use crate::adapters::sqlite::{PoolConfig, SqliteAggregateStore};
use crate::application::IngestRuntime;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::logging::LoggerImpl;
use crate::services::{AccumulatorService, ConflictRetry};

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Override the read API port
    #[arg(long)]
    pub port: Option<u16>,

    /// Override the store directory
    #[arg(long)]
    pub store_dir: Option<PathBuf>,

    /// Override the Kafka bootstrap brokers
    #[arg(long)]
    pub brokers: Option<String>,
}

impl ServeArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.http.port = port;
        }
        if let Some(dir) = &self.store_dir {
            config.store.dir = dir.display().to_string();
        }
        if let Some(brokers) = &self.brokers {
            config.consumer.brokers.clone_from(brokers);
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ServeOutput {
    pub app_name: String,
    pub sessions: u64,
}

impl CommandOutput for ServeOutput {
    fn to_human(&self) -> String {
        format!(
            "{} stopped after {} assignment session(s).",
            self.app_name, self.sessions
        )
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: ServeArgs, config_path: Option<&Path>, json_mode: bool) -> Result<()> {
    let mut config = ConfigLoader::load(config_path)?;
    args.apply(&mut config);
    ConfigLoader::validate(&config)?;

    let _logger = LoggerImpl::init(&config.logging).context("Failed to initialize logging")?;
    info!(app_name = %config.app_name, "starting");

    let store_dir = PathBuf::from(&config.store.dir);
    let open_timeout = Duration::from_secs(config.store.open_timeout_secs);
    let store = tokio::time::timeout(
        open_timeout,
        SqliteAggregateStore::open(&store_dir, &PoolConfig::from(&config.store)),
    )
    .await
    .map_err(|_| anyhow!("Timed out after {open_timeout:?} opening store at {}", store_dir.display()))?
    .with_context(|| format!("Failed to open store at {}", store_dir.display()))?;

    let service = Arc::new(AccumulatorService::new(
        store,
        ConflictRetry::from(&config.accumulator),
    ));

    let prepared = async {
        let log = KafkaObservationLog::connect(&config.consumer, &config.app_name)
            .context("Failed to create Kafka consumer")?;
        let listener = ReadApiServer::bind(&config.http).await.with_context(|| {
            format!("Failed to bind read API on {}:{}", config.http.host, config.http.port)
        })?;
        Ok::<_, anyhow::Error>((log, listener))
    }
    .await;
    let (log, listener) = match prepared {
        Ok(parts) => parts,
        Err(err) => {
            service.close().await;
            return Err(err);
        }
    };

    let runtime = IngestRuntime::new(
        service,
        config.app_name.clone(),
        Duration::from_secs(config.consumer.join_timeout_secs),
    );
    let report = runtime
        .run(log, listener, shutdown_signal())
        .await
        .context("tally stopped with an error")?;

    output(
        &ServeOutput {
            app_name: config.app_name,
            sessions: report.sessions,
        },
        json_mode,
    );
    Ok(())
}

/// Resolves on ctrl-c, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("ctrl-c received"),
        () = terminate => info!("SIGTERM received"),
    }
}
