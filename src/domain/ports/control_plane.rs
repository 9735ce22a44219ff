//! Control plane port: job intake and report publishing.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

use crate::domain::errors::ControlPlaneResult;
use crate::domain::models::Job;

/// Control plane endpoints the agent writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Event log lines
    Logs,
    /// Process events with full event data
    ProcessEvents,
    /// Step life-cycle records
    ProcessLifeCycleEvents,
    /// Managed object change notifications
    KubeEvents,
    /// Agent registration
    Agents,
}

impl Endpoint {
    /// Path relative to the control plane base URL
    pub const fn path(self) -> &'static str {
        match self {
            Self::Logs => "/logs",
            Self::ProcessEvents => "/processes_events",
            Self::ProcessLifeCycleEvents => "/process_life_cycle_events",
            Self::KubeEvents => "/kube_events",
            Self::Agents => "/agents",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Remote control plane that hands out jobs and receives reports
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Fetch at most `count` pending jobs for this agent.
    async fn fetch_jobs(&self, count: usize) -> ControlPlaneResult<Vec<Job>>;

    /// POST a JSON body to `endpoint`.
    async fn publish(&self, endpoint: Endpoint, body: Value) -> ControlPlaneResult<()>;
}
