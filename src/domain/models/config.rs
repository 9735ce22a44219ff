use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for the agent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Agent identity and terminal endpoint
    #[serde(default)]
    pub agent: AgentConfig,

    /// Control plane connection
    #[serde(default)]
    pub control_plane: ControlPlaneConfig,

    /// Job polling
    #[serde(default)]
    pub puller: PullerConfig,

    /// Reconciliation timings and retry budgets
    #[serde(default)]
    pub reconcile: ReconcileConfig,

    /// Cluster connection
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Publishing of agent-owned cluster object changes
    #[serde(default)]
    pub kube_events: KubeEventsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Agent identity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AgentConfig {
    /// Name reported with every pull and life-cycle record
    #[serde(default)]
    pub name: String,

    /// Shared secret sent in the `token` header
    #[serde(default)]
    pub token: String,

    /// Base URL of the agent's terminal endpoint, announced at registration
    #[serde(default)]
    pub terminal_base_url: String,

    /// API version announced at registration
    #[serde(default = "default_terminal_api_version")]
    pub terminal_api_version: String,
}

fn default_terminal_api_version() -> String {
    "v1".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            token: String::new(),
            terminal_base_url: String::new(),
            terminal_api_version: default_terminal_api_version(),
        }
    }
}

/// Control plane connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ControlPlaneConfig {
    /// Base URL of the control plane API, e.g. `http://api:8080/api/v1`
    #[serde(default)]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

const fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ControlPlaneConfig {
    /// Per-request timeout.
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Job polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PullerConfig {
    /// Maximum number of jobs reconciled at the same time
    #[serde(default = "default_pull_size")]
    pub pull_size: usize,

    /// Delay between pulls in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

const fn default_pull_size() -> usize {
    4
}

const fn default_poll_interval_ms() -> u64 {
    500
}

impl Default for PullerConfig {
    fn default() -> Self {
        Self {
            pull_size: default_pull_size(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl PullerConfig {
    /// Delay between polling rounds.
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Reconciliation timings and retry budgets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReconcileConfig {
    /// Attempts made when a patch hits a resourceVersion conflict
    #[serde(default = "default_conflict_retry_attempts")]
    pub conflict_retry_attempts: u32,

    /// Delay between conflicting attempts in milliseconds
    #[serde(default = "default_conflict_retry_interval_ms")]
    pub conflict_retry_interval_ms: u64,

    /// Per-pod readiness timeout for Deployments
    #[serde(default = "default_deployment_pod_timeout_secs")]
    pub deployment_pod_timeout_secs: u64,

    /// Per-pod readiness timeout for StatefulSets
    #[serde(default = "default_stateful_set_pod_timeout_secs")]
    pub stateful_set_pod_timeout_secs: u64,

    /// Pod status polling interval in milliseconds
    #[serde(default = "default_pod_poll_interval_ms")]
    pub pod_poll_interval_ms: u64,

    /// Attempts made to observe replacement pods after a write
    #[serde(default = "default_new_pod_list_attempts")]
    pub new_pod_list_attempts: u32,

    /// Delay between replacement pod listings in milliseconds
    #[serde(default = "default_new_pod_list_delay_ms")]
    pub new_pod_list_delay_ms: u64,
}

const fn default_conflict_retry_attempts() -> u32 {
    5
}

const fn default_conflict_retry_interval_ms() -> u64 {
    10
}

const fn default_deployment_pod_timeout_secs() -> u64 {
    150
}

const fn default_stateful_set_pod_timeout_secs() -> u64 {
    450
}

const fn default_pod_poll_interval_ms() -> u64 {
    1000
}

const fn default_new_pod_list_attempts() -> u32 {
    10
}

const fn default_new_pod_list_delay_ms() -> u64 {
    2000
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            conflict_retry_attempts: default_conflict_retry_attempts(),
            conflict_retry_interval_ms: default_conflict_retry_interval_ms(),
            deployment_pod_timeout_secs: default_deployment_pod_timeout_secs(),
            stateful_set_pod_timeout_secs: default_stateful_set_pod_timeout_secs(),
            pod_poll_interval_ms: default_pod_poll_interval_ms(),
            new_pod_list_attempts: default_new_pod_list_attempts(),
            new_pod_list_delay_ms: default_new_pod_list_delay_ms(),
        }
    }
}

/// Cluster connection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ClusterConfig {
    /// Explicit kubeconfig path. In-cluster credentials are used when absent.
    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,
}

/// Publishing of agent-owned cluster object changes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct KubeEventsConfig {
    /// Start the label watchers and publisher
    #[serde(default)]
    pub enabled: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format (json, pretty)
    #[serde(default)]
    pub format: LogFormat,

    /// Directory for log files (optional, if None logs only to stdout)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Log rotation policy
    #[serde(default)]
    pub rotation: RotationPolicy,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            log_dir: None,
            rotation: RotationPolicy::default(),
        }
    }
}

/// Log line format
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Log file rotation
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    #[default]
    Daily,
    Hourly,
    Never,
}
