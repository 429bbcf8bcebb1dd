//! tally CLI entry point.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tally::cli::commands::{config, get, serve};
use tally::cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    // `serve` installs the configured logger; one-shot commands only report
    // warnings to stderr.
    if !matches!(cli.command, Commands::Serve(_)) {
        tracing_subscriber::registry()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let result = match cli.command {
        Commands::Serve(args) => serve::execute(args, config_path, cli.json).await,
        Commands::Get(args) => get::execute(args, config_path, cli.json).await,
        Commands::Config(args) => config::execute(args, config_path, cli.json).await,
    };

    if let Err(err) = result {
        tally::cli::handle_error(err, cli.json);
    }
}
