//! `ci-agent config`

use anyhow::{Context, Result};

use crate::domain::models::Config;

/// Print the effective configuration with the token masked.
pub fn execute(mut config: Config, json_mode: bool) -> Result<()> {
    if !config.agent.token.is_empty() {
        config.agent.token = "********".to_string();
    }

    if json_mode {
        println!(
            "{}",
            serde_json::to_string_pretty(&config).context("Failed to encode configuration")?
        );
    } else {
        print!(
            "{}",
            serde_yaml::to_string(&config).context("Failed to encode configuration")?
        );
    }
    Ok(())
}
