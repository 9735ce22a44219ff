//! Waiting for the pods created by a rollout to run.

use k8s_openapi::api::core::v1::Pod;
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::domain::errors::{ClusterError, ReadinessError};
use crate::domain::ports::{ClusterApi, DiscoveredResource, ResourceTarget};

use super::workload::RolloutTracking;

/// Container waiting reasons that will not resolve on their own.
const FATAL_WAITING_REASONS: &[&str] = &["ImagePullBackOff", "CrashLoopBackOff"];

/// Pods present before a write, used to tell replacement pods apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodBaseline {
    /// Names of the pods that existed; replacements get fresh names.
    ByName(HashSet<String>),
    /// Resource versions of the pods that existed, for kinds whose
    /// replacement pods reuse their names.
    ByRevision(HashSet<String>),
}

impl PodBaseline {
    /// A baseline that treats every pod as new.
    pub fn empty(tracking: RolloutTracking) -> Self {
        match tracking {
            RolloutTracking::ByResourceVersion => Self::ByRevision(HashSet::new()),
            RolloutTracking::ByPodName | RolloutTracking::None => Self::ByName(HashSet::new()),
        }
    }

    /// Record the keys of `pods` according to `tracking`.
    pub fn capture(tracking: RolloutTracking, pods: &[Value]) -> Self {
        let keys = |pointer: &str| {
            pods.iter()
                .filter_map(|pod| pod.pointer(pointer).and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        };
        match tracking {
            RolloutTracking::ByResourceVersion => Self::ByRevision(keys("/metadata/resourceVersion")),
            RolloutTracking::ByPodName | RolloutTracking::None => Self::ByName(keys("/metadata/name")),
        }
    }

    /// Whether `pod` was not part of the baseline.
    pub fn is_new(&self, pod: &Value) -> bool {
        let (known, pointer) = match self {
            Self::ByName(names) => (names, "/metadata/name"),
            Self::ByRevision(revisions) => (revisions, "/metadata/resourceVersion"),
        };
        pod.pointer(pointer)
            .and_then(Value::as_str)
            .is_some_and(|key| !known.contains(key))
    }
}

/// Polling parameters of a readiness wait.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessPolicy {
    /// How long each pod gets to reach `Running`.
    pub per_pod_timeout: Duration,
    /// Delay between status reads of one pod.
    pub poll_interval: Duration,
    /// Pod listings made while looking for replacement pods.
    pub list_attempts: u32,
    /// Delay between those listings.
    pub list_delay: Duration,
}

enum PodState {
    Running,
    Waiting(Option<String>),
}

fn assess(name: &str, pod: &Pod) -> Result<PodState, ReadinessError> {
    let Some(status) = pod.status.as_ref() else {
        return Ok(PodState::Waiting(None));
    };

    let fatal = status
        .container_statuses
        .iter()
        .flatten()
        .filter_map(|container| container.state.as_ref()?.waiting.as_ref()?.reason.as_deref())
        .find(|reason| FATAL_WAITING_REASONS.contains(reason));
    if let Some(reason) = fatal {
        return Err(ReadinessError::ContainerWaiting {
            pod: name.to_string(),
            reason: reason.to_string(),
        });
    }

    match status.phase.as_deref() {
        Some("Running") => Ok(PodState::Running),
        Some(phase @ ("Failed" | "Succeeded")) => Err(ReadinessError::PodTerminated {
            pod: name.to_string(),
            phase: phase.to_string(),
        }),
        _ => Ok(PodState::Waiting(
            status
                .conditions
                .iter()
                .flatten()
                .filter_map(|condition| condition.message.clone())
                .last(),
        )),
    }
}

/// List pods matching `selector` that are not in `baseline`, retrying while
/// none have appeared yet.
///
/// Once the retries are spent every matching pod is returned instead, so a
/// rollout that reused its pods still gets checked. Only an empty selection
/// is an error.
async fn new_pods(
    cluster: &dyn ClusterApi,
    namespace: &str,
    selector: &str,
    baseline: &PodBaseline,
    policy: &ReadinessPolicy,
) -> Result<Vec<String>, ReadinessError> {
    let pods = ResourceTarget::new(DiscoveredResource::pods(), namespace, "");
    let mut matching = Vec::new();
    for attempt in 1..=policy.list_attempts {
        let listed = cluster
            .list(&pods, selector)
            .await
            .map_err(ReadinessError::Lookup)?;
        let fresh = pod_names(listed.iter().filter(|pod| baseline.is_new(pod)));
        if !fresh.is_empty() {
            return Ok(fresh);
        }
        matching = pod_names(listed.iter());
        debug!(attempt, namespace, selector, "no new pods yet");
        if attempt < policy.list_attempts {
            tokio::time::sleep(policy.list_delay).await;
        }
    }
    if matching.is_empty() {
        return Err(ReadinessError::NoNewPods {
            namespace: namespace.to_string(),
            selector: selector.to_string(),
        });
    }
    info!(namespace, selector, count = matching.len(), "no new pods, checking existing ones");
    Ok(matching)
}

fn pod_names<'a>(pods: impl Iterator<Item = &'a Value>) -> Vec<String> {
    pods.filter_map(|pod| pod.pointer("/metadata/name").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

async fn wait_for_pod_running(
    cluster: &dyn ClusterApi,
    namespace: &str,
    name: &str,
    policy: &ReadinessPolicy,
) -> Result<(), ReadinessError> {
    let target = ResourceTarget::new(DiscoveredResource::pods(), namespace, name);
    let deadline = Instant::now() + policy.per_pod_timeout;
    loop {
        let value = cluster.get(&target).await.map_err(ReadinessError::Lookup)?;
        let pod: Pod = serde_json::from_value(value)
            .map_err(|e| ReadinessError::Lookup(ClusterError::Decode(e.to_string())))?;

        let last_message = match assess(name, &pod)? {
            PodState::Running => return Ok(()),
            PodState::Waiting(message) => message,
        };

        if Instant::now() >= deadline {
            return Err(ReadinessError::Timeout {
                pod: name.to_string(),
                message: last_message
                    .unwrap_or_else(|| format!("timed out waiting for pod {name} to run")),
            });
        }
        tokio::time::sleep(policy.poll_interval).await;
    }
}

/// Wait until every pod created since `baseline` is running.
///
/// When no pod outside the baseline shows up, the matching pods are checked
/// instead. Pods are checked one after another, each with its own timeout. The first
/// failure ends the wait.
pub async fn wait_for_new_pods_running(
    cluster: &dyn ClusterApi,
    namespace: &str,
    selector: &str,
    baseline: &PodBaseline,
    policy: &ReadinessPolicy,
) -> Result<(), ReadinessError> {
    let pods = new_pods(cluster, namespace, selector, baseline, policy).await?;
    info!(namespace, count = pods.len(), "waiting for new pods");
    for name in &pods {
        wait_for_pod_running(cluster, namespace, name, policy).await?;
        debug!(namespace, pod = %name, "pod running");
    }
    Ok(())
}
