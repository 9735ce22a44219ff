//! ci-agent entry point.

use anyhow::Context;
use clap::Parser;

use ci_agent::cli::{commands, handle_error, Cli, Commands};
use ci_agent::infrastructure::logging::LoggerImpl;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(&cli).await {
        handle_error(&err, cli.json);
    }
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = cli.load_config()?;

    match cli.command {
        Commands::Config => commands::config::execute(config, cli.json),
        Commands::Run => {
            let _logger = LoggerImpl::init(&config.logging).context("Failed to initialize logging")?;
            commands::run::execute(config).await
        }
    }
}
