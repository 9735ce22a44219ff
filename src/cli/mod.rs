//! Command-line interface.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;

/// Parsed command line.
#[derive(Parser, Debug)]
#[command(name = "ci-agent")]
#[command(about = "Cluster-resident deployment agent for CI pipelines", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to run
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file, instead of .ci-agent/config.yaml
    #[arg(short, long, global = true, env = "CI_AGENT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Register with the control plane and process jobs until interrupted
    Run,

    /// Print the effective configuration
    Config,
}

impl Cli {
    /// Load configuration from `--config` or the default locations.
    pub fn load_config(&self) -> anyhow::Result<Config> {
        match &self.config {
            Some(path) => ConfigLoader::load_from_file(path),
            None => ConfigLoader::load(),
        }
    }
}

/// Print `err` in the requested format and exit with status 1.
pub fn handle_error(err: &anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let output = serde_json::json!({
            "error": err.to_string(),
            "causes": err.chain().skip(1).map(ToString::to_string).collect::<Vec<_>>(),
        });
        eprintln!("{output}");
    } else {
        eprintln!("Error: {err:#}");
    }
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["ci-agent", "config", "--json", "--config", "agent.yaml"])
            .unwrap();
        assert!(matches!(cli.command, Commands::Config));
        assert!(cli.json);
        assert_eq!(cli.config, Some(PathBuf::from("agent.yaml")));
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["ci-agent"]).is_err());
    }
}
