pub mod config;
pub mod event;
pub mod job;
pub mod kube_event;
pub mod life_cycle;

pub use config::{
    AgentConfig, ClusterConfig, Config, ControlPlaneConfig, KubeEventsConfig, LogFormat,
    LoggingConfig, PullerConfig, ReconcileConfig, RotationPolicy,
};
pub use event::{EventKind, Footmark, ProcessStatus, ProgressEvent};
pub use job::{
    ImageSpec, Job, JobEnvelope, Pipeline, PipelineMetadata, PipelineStep, WorkloadKind,
    MANAGED_LABEL, MANAGED_LABEL_VALUE,
};
pub use kube_event::{KubeEventCommand, KubeEventHeader, KubeEventMessage};
pub use life_cycle::{LifeCycleBatch, LifeCycleRecord, LifeCycleStatus};
