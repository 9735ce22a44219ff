//! Domain errors for the deployment agent.

use thiserror::Error;

/// Errors surfaced by the cluster API port.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: String, name: String },

    #[error("Operation cannot be fulfilled on {kind} {name}: {message}")]
    Conflict {
        kind: String,
        name: String,
        message: String,
    },

    #[error("Cluster API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Cluster transport error: {0}")]
    Transport(String),

    #[error("Cluster response decode error: {0}")]
    Decode(String),
}

impl ClusterError {
    /// Whether the error is an optimistic-concurrency conflict.
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Whether a create hit an existing object.
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

/// Result of a cluster API call.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Errors raised while waiting for replacement pods.
#[derive(Debug, Error)]
pub enum ReadinessError {
    #[error("no pods found in namespace {namespace} for selector {selector}")]
    NoNewPods { namespace: String, selector: String },

    #[error("Pod has error: {reason}")]
    ContainerWaiting { pod: String, reason: String },

    #[error("pod {pod} ran to completion or failed (phase {phase})")]
    PodTerminated { pod: String, phase: String },

    #[error("{message}")]
    Timeout { pod: String, message: String },

    #[error("failed to look up pod state: {0}")]
    Lookup(#[source] ClusterError),
}

/// Errors that end the reconciliation of a job.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("unknown resource kind: {0}")]
    UnknownKind(String),

    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("Failed to get latest version of {kind}: {source}")]
    Fetch {
        kind: String,
        #[source]
        source: ClusterError,
    },

    #[error("giving up after {attempts} conflicting updates: {source}")]
    Conflict {
        attempts: u32,
        #[source]
        source: ClusterError,
    },

    #[error("{0}")]
    Cluster(#[from] ClusterError),

    #[error("{0}")]
    Readiness(#[from] ReadinessError),

    #[error("failed to decode {kind}: {message}")]
    Decode { kind: String, message: String },

    #[error("{failed} of {total} descriptors failed to apply")]
    DescriptorsFailed { failed: usize, total: usize },
}

/// Result of a reconciliation step.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Errors talking to the control plane.
#[derive(Debug, Error)]
pub enum ControlPlaneError {
    #[error("control plane request failed: {0}")]
    Transport(String),

    #[error("control plane returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode control plane response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ControlPlaneError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Result of a control plane call.
pub type ControlPlaneResult<T> = Result<T, ControlPlaneError>;
