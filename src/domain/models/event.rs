//! Progress events emitted while a job is reconciled.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::job::{Job, Pipeline, WorkloadKind};

/// Pipeline status carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessStatus {
    /// Starting a phase.
    Initializing,
    /// Working.
    Processing,
    /// Finished.
    Successful,
    /// Finished with an error.
    Failed,
    /// Unexpected agent error.
    Error,
    /// Shutting down.
    Terminating,
}

impl ProcessStatus {
    /// Wire spelling.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initializing => "INITIALIZING",
            Self::Processing => "PROCESSING",
            Self::Successful => "SUCCESSFUL",
            Self::Failed => "FAILED",
            Self::Error => "ERROR",
            Self::Terminating => "TERMINATING",
        }
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase of the agent job an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Footmark {
    /// Job accepted by the agent.
    InitAgentJob,
    /// Descriptors and workload being written.
    UpdateResource,
    /// Job finished.
    PostAgentJob,
}

impl Footmark {
    /// Wire spelling.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InitAgentJob => "init_agent_job",
            Self::UpdateResource => "update_resource",
            Self::PostAgentJob => "post_agent_job",
        }
    }
}

impl fmt::Display for Footmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of event kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A phase of the job is starting.
    Initializing {
        /// Phase being entered.
        footmark: Footmark,
    },
    /// Work in progress.
    Processing {
        /// Phase the work belongs to.
        footmark: Footmark,
    },
    /// Non-fatal problem. Carries no status so it never moves the pipeline.
    Warning {
        /// Phase the problem occurred in.
        footmark: Footmark,
    },
    /// The job finished.
    Successful,
    /// The job failed.
    Failed {
        /// Error text reported upstream.
        reason: String,
    },
}

impl EventKind {
    /// Status reported upstream; `None` for warnings.
    pub const fn status(&self) -> Option<ProcessStatus> {
        match self {
            Self::Initializing { .. } => Some(ProcessStatus::Initializing),
            Self::Processing { .. } => Some(ProcessStatus::Processing),
            Self::Warning { .. } => None,
            Self::Successful => Some(ProcessStatus::Successful),
            Self::Failed { .. } => Some(ProcessStatus::Failed),
        }
    }

    /// Phase of the job; terminal kinds belong to `post_agent_job`.
    pub const fn footmark(&self) -> Footmark {
        match self {
            Self::Initializing { footmark }
            | Self::Processing { footmark }
            | Self::Warning { footmark } => *footmark,
            Self::Successful | Self::Failed { .. } => Footmark::PostAgentJob,
        }
    }

    /// Whether this kind ends the job.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Successful | Self::Failed { .. })
    }
}

/// Structured progress report for one job.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    /// Pipeline step of the job.
    pub step: String,
    /// Pipeline run the job belongs to.
    pub process_id: String,
    /// Owning company.
    pub company_id: String,
    /// Workload name; empty for descriptor-only jobs.
    pub name: String,
    /// Namespace of the job.
    pub namespace: String,
    /// Correlation token echoed from the job.
    pub claim: i64,
    /// Workload kind of the job.
    pub resource_kind: Option<WorkloadKind>,
    /// Human-readable message.
    pub log: String,
    /// What happened.
    pub kind: EventKind,
    /// Pipeline graph, used for life-cycle fan-out.
    pub pipeline: Option<Pipeline>,
}

impl ProgressEvent {
    /// Build an event carrying `job`'s identity.
    pub fn for_job(job: &Job, kind: EventKind, log: impl Into<String>) -> Self {
        Self {
            step: job.step.clone(),
            process_id: job.process_id.clone(),
            company_id: job.company_id().to_string(),
            name: job.name.clone(),
            namespace: job.namespace.clone(),
            claim: job.claim,
            resource_kind: job.kind,
            log: log.into(),
            kind,
            pipeline: job.pipeline.clone(),
        }
    }

    /// See [`EventKind::status`].
    pub const fn status(&self) -> Option<ProcessStatus> {
        self.kind.status()
    }

    /// See [`EventKind::footmark`].
    pub const fn footmark(&self) -> Footmark {
        self.kind.footmark()
    }

    /// Failure reason, or `n/a`.
    pub fn reason(&self) -> &str {
        match &self.kind {
            EventKind::Failed { reason } => reason,
            _ => "n/a",
        }
    }

    /// Key/value view of the event sent to the process event endpoint.
    pub fn event_data(&self) -> Map<String, Value> {
        let mut data = Map::new();
        data.insert("step".into(), Value::from(self.step.as_str()));
        data.insert("process_id".into(), Value::from(self.process_id.as_str()));
        data.insert("company_id".into(), Value::from(self.company_id.as_str()));
        data.insert("claim".into(), Value::from(self.claim.to_string()));
        data.insert("footmark".into(), Value::from(self.footmark().as_str()));
        data.insert("log".into(), Value::from(self.log.as_str()));
        data.insert("reason".into(), Value::from(self.reason()));
        if let Some(status) = self.status() {
            data.insert("status".into(), Value::from(status.as_str()));
        }
        if let Some(kind) = self.resource_kind {
            data.insert("type".into(), Value::from(kind.as_kind()));
        }
        data
    }
}
