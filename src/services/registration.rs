//! Announcing the agent to the control plane.

use serde::Serialize;
use tracing::{info, warn};

use crate::domain::errors::{ControlPlaneError, ControlPlaneResult};
use crate::domain::models::AgentConfig;
use crate::domain::ports::{ControlPlane, Endpoint};

#[derive(Debug, Serialize)]
struct Registration<'a> {
    name: &'a str,
    api_version: &'a str,
    terminal_base_url: &'a str,
}

/// POST the agent identity to `/agents`.
pub async fn register_agent(
    control_plane: &dyn ControlPlane,
    agent: &AgentConfig,
) -> ControlPlaneResult<()> {
    let body = serde_json::to_value(Registration {
        name: &agent.name,
        api_version: &agent.terminal_api_version,
        terminal_base_url: &agent.terminal_base_url,
    })
    .map_err(|e| ControlPlaneError::Decode(e.to_string()))?;
    control_plane.publish(Endpoint::Agents, body).await?;
    info!(agent = %agent.name, "agent registered");
    Ok(())
}

/// Register, logging instead of failing.
pub async fn register_agent_best_effort(control_plane: &dyn ControlPlane, agent: &AgentConfig) {
    if let Err(e) = register_agent(control_plane, agent).await {
        warn!(agent = %agent.name, error = %e, "agent registration failed");
    }
}
