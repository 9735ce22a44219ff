//! Common test utilities for integration tests
//!
//! In-memory fakes of the cluster and control plane ports plus a recording
//! observer, shared across the integration test files.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ci_agent::domain::errors::{ClusterError, ClusterResult, ControlPlaneError, ControlPlaneResult};
use ci_agent::domain::models::{Job, ProgressEvent, ReconcileConfig};
use ci_agent::domain::ports::{
    ClusterApi, ControlPlane, DiscoveredResource, Endpoint, Observer, ResourceTarget,
};

type ObjectKey = (String, String, String);

fn key(target: &ResourceTarget) -> ObjectKey {
    let namespace = if target.resource.namespaced {
        target.namespace.clone()
    } else {
        String::new()
    };
    (target.resource.plural.clone(), namespace, target.name.clone())
}

/// Apply a JSON merge patch; arrays are replaced whole.
fn merge(target: &mut Value, patch: &Value) {
    match (target.as_object_mut(), patch.as_object()) {
        (Some(target), Some(patch)) => {
            for (field, value) in patch {
                if value.is_null() {
                    target.remove(field);
                } else {
                    merge(target.entry(field.clone()).or_insert(Value::Null), value);
                }
            }
        }
        (None, Some(_)) => {
            *target = Value::Object(Map::new());
            merge(target, patch);
        }
        _ => *target = patch.clone(),
    }
}

fn labels_match(object: &Value, selector: &str) -> bool {
    selector
        .split(',')
        .filter(|pair| !pair.is_empty())
        .all(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            object
                .pointer(&format!("/metadata/labels/{name}"))
                .and_then(Value::as_str)
                == Some(value)
        })
}

/// In-memory cluster.
///
/// A patch that touches the pod template of a deployment or stateful set
/// simulates its rollout by creating (or replacing) one pod with the
/// template labels and `rollout_status`. Patches to metadata or replicas
/// alone leave the pods as they are.
pub struct FakeCluster {
    objects: Mutex<HashMap<ObjectKey, Value>>,
    discovery: HashMap<String, Vec<DiscoveredResource>>,
    revision: AtomicU64,
    conflicts: AtomicU32,
    patch_calls: AtomicUsize,
    update_calls: AtomicUsize,
    rollout_status: Mutex<Value>,
    get_delay: Mutex<Duration>,
    patches: Mutex<Vec<Value>>,
}

impl Default for FakeCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCluster {
    pub fn new() -> Self {
        let discovery = HashMap::from([
            (
                "v1".to_string(),
                vec![
                    DiscoveredResource::new("", "v1", "ConfigMap", "configmaps", true),
                    DiscoveredResource::new("", "v1", "Service", "services", true),
                    DiscoveredResource::new("", "v1", "Namespace", "namespaces", false),
                    DiscoveredResource::pods(),
                ],
            ),
            (
                "apps/v1".to_string(),
                vec![
                    DiscoveredResource::new("apps", "v1", "Deployment", "deployments", true),
                    DiscoveredResource::new("apps", "v1", "StatefulSet", "statefulsets", true),
                    DiscoveredResource::new("apps", "v1", "DaemonSet", "daemonsets", true),
                ],
            ),
        ]);

        Self {
            objects: Mutex::new(HashMap::new()),
            discovery,
            revision: AtomicU64::new(100),
            conflicts: AtomicU32::new(0),
            patch_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
            rollout_status: Mutex::new(json!({"phase": "Running"})),
            get_delay: Mutex::new(Duration::ZERO),
            patches: Mutex::new(Vec::new()),
        }
    }

    fn next_revision(&self) -> String {
        (self.revision.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    /// Store `object` directly, bypassing the port.
    pub fn seed(&self, resource: DiscoveredResource, mut object: Value) {
        let namespace = object
            .pointer("/metadata/namespace")
            .and_then(Value::as_str)
            .unwrap_or("default")
            .to_string();
        let name = object
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        object["metadata"]["resourceVersion"] = Value::from(self.next_revision());
        let target = ResourceTarget::new(resource, &namespace, &name);
        self.objects.lock().unwrap().insert(key(&target), object);
    }

    pub fn object(&self, resource: DiscoveredResource, namespace: &str, name: &str) -> Option<Value> {
        let target = ResourceTarget::new(resource, namespace, name);
        self.objects.lock().unwrap().get(&key(&target)).cloned()
    }

    /// Fail the next `count` writes with a conflict.
    pub fn inject_conflicts(&self, count: u32) {
        self.conflicts.store(count, Ordering::SeqCst);
    }

    /// Status given to pods created by simulated rollouts.
    pub fn set_rollout_status(&self, status: Value) {
        *self.rollout_status.lock().unwrap() = status;
    }

    pub fn set_get_delay(&self, delay: Duration) {
        *self.get_delay.lock().unwrap() = delay;
    }

    pub fn patch_calls(&self) -> usize {
        self.patch_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn patches(&self) -> Vec<Value> {
        self.patches.lock().unwrap().clone()
    }

    fn take_conflict(&self, target: &ResourceTarget) -> ClusterResult<()> {
        let injected = self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if injected {
            return Err(ClusterError::Conflict {
                kind: target.resource.kind.clone(),
                name: target.name.clone(),
                message: "the object has been modified".to_string(),
            });
        }
        Ok(())
    }

    fn check_revision(target: &ResourceTarget, stored: &Value, incoming: &Value) -> ClusterResult<()> {
        let expected = incoming.pointer("/metadata/resourceVersion");
        if expected.is_some() && expected != stored.pointer("/metadata/resourceVersion") {
            return Err(ClusterError::Conflict {
                kind: target.resource.kind.clone(),
                name: target.name.clone(),
                message: "stale resourceVersion".to_string(),
            });
        }
        Ok(())
    }

    fn simulate_rollout(&self, target: &ResourceTarget, workload: &Value) {
        let stateful = match target.resource.plural.as_str() {
            "deployments" => false,
            "statefulsets" => true,
            _ => return,
        };
        let replicas = workload
            .pointer("/spec/replicas")
            .and_then(Value::as_i64)
            .unwrap_or(1);
        if replicas < 1 {
            return;
        }

        let revision = self.next_revision();
        let name = if stateful {
            format!("{}-0", target.name)
        } else {
            format!("{}-{revision}", target.name)
        };
        let labels = workload
            .pointer("/spec/template/metadata/labels")
            .cloned()
            .unwrap_or_else(|| json!({}));
        let containers = workload
            .pointer("/spec/template/spec/containers")
            .cloned()
            .unwrap_or_else(|| json!([]));
        let pod = json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": name,
                "namespace": target.namespace,
                "labels": labels,
                "resourceVersion": revision,
            },
            "spec": {"containers": containers},
            "status": self.rollout_status.lock().unwrap().clone(),
        });
        let pod_target = ResourceTarget::new(DiscoveredResource::pods(), &target.namespace, &name);
        self.objects.lock().unwrap().insert(key(&pod_target), pod);
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn resources_for_group_version(
        &self,
        api_version: &str,
    ) -> ClusterResult<Vec<DiscoveredResource>> {
        self.discovery
            .get(api_version)
            .cloned()
            .ok_or_else(|| ClusterError::Api {
                code: 404,
                message: format!("no resources for {api_version}"),
            })
    }

    async fn get(&self, target: &ResourceTarget) -> ClusterResult<Value> {
        let delay = *self.get_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.objects
            .lock()
            .unwrap()
            .get(&key(target))
            .cloned()
            .ok_or_else(|| ClusterError::NotFound {
                kind: target.resource.kind.clone(),
                name: target.name.clone(),
            })
    }

    async fn list(&self, target: &ResourceTarget, label_selector: &str) -> ClusterResult<Vec<Value>> {
        let (plural, namespace, _) = key(target);
        let objects = self.objects.lock().unwrap();
        let mut matching: Vec<(String, Value)> = objects
            .iter()
            .filter(|((p, n, _), object)| {
                *p == plural && *n == namespace && labels_match(object, label_selector)
            })
            .map(|((_, _, name), object)| (name.clone(), object.clone()))
            .collect();
        matching.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(matching.into_iter().map(|(_, object)| object).collect())
    }

    async fn create(&self, target: &ResourceTarget, object: &Value) -> ClusterResult<Value> {
        let mut objects = self.objects.lock().unwrap();
        let key = key(target);
        if objects.contains_key(&key) {
            return Err(ClusterError::AlreadyExists {
                kind: target.resource.kind.clone(),
                name: target.name.clone(),
            });
        }
        let mut stored = object.clone();
        stored["metadata"]["resourceVersion"] = Value::from(self.next_revision());
        objects.insert(key, stored.clone());
        Ok(stored)
    }

    async fn update(&self, target: &ResourceTarget, object: &Value) -> ClusterResult<Value> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.take_conflict(target)?;
        let mut objects = self.objects.lock().unwrap();
        let stored = objects.get_mut(&key(target)).ok_or_else(|| ClusterError::NotFound {
            kind: target.resource.kind.clone(),
            name: target.name.clone(),
        })?;
        Self::check_revision(target, stored, object)?;
        *stored = object.clone();
        stored["metadata"]["resourceVersion"] = Value::from(self.next_revision());
        Ok(stored.clone())
    }

    async fn patch(&self, target: &ResourceTarget, patch: &Value) -> ClusterResult<Value> {
        self.patch_calls.fetch_add(1, Ordering::SeqCst);
        self.take_conflict(target)?;
        let updated = {
            let mut objects = self.objects.lock().unwrap();
            let stored = objects.get_mut(&key(target)).ok_or_else(|| ClusterError::NotFound {
                kind: target.resource.kind.clone(),
                name: target.name.clone(),
            })?;
            Self::check_revision(target, stored, patch)?;
            merge(stored, patch);
            stored["metadata"]["resourceVersion"] = Value::from(self.next_revision());
            stored.clone()
        };
        self.patches.lock().unwrap().push(patch.clone());
        if patch.pointer("/spec/template").is_some() {
            self.simulate_rollout(target, &updated);
        }
        Ok(updated)
    }
}

/// Control plane double: hands out queued job batches and records posts.
#[derive(Default)]
pub struct RecordingControlPlane {
    batches: Mutex<Vec<Vec<Job>>>,
    fetches: Mutex<Vec<usize>>,
    published: Mutex<Vec<(Endpoint, Value)>>,
    fail_publish: Mutex<bool>,
}

impl RecordingControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one batch returned by the next fetch.
    pub fn queue_jobs(&self, jobs: Vec<Job>) {
        self.batches.lock().unwrap().push(jobs);
    }

    /// Counts requested by every fetch so far.
    pub fn fetches(&self) -> Vec<usize> {
        self.fetches.lock().unwrap().clone()
    }

    pub fn published(&self) -> Vec<(Endpoint, Value)> {
        self.published.lock().unwrap().clone()
    }

    pub fn published_to(&self, endpoint: Endpoint) -> Vec<Value> {
        self.published()
            .into_iter()
            .filter(|(e, _)| *e == endpoint)
            .map(|(_, body)| body)
            .collect()
    }

    pub fn fail_publishes(&self) {
        *self.fail_publish.lock().unwrap() = true;
    }
}

#[async_trait]
impl ControlPlane for RecordingControlPlane {
    async fn fetch_jobs(&self, count: usize) -> ControlPlaneResult<Vec<Job>> {
        self.fetches.lock().unwrap().push(count);
        let mut batches = self.batches.lock().unwrap();
        if batches.is_empty() {
            Ok(Vec::new())
        } else {
            Ok(batches.remove(0))
        }
    }

    async fn publish(&self, endpoint: Endpoint, body: Value) -> ControlPlaneResult<()> {
        self.published.lock().unwrap().push((endpoint, body));
        if *self.fail_publish.lock().unwrap() {
            return Err(ControlPlaneError::Status {
                status: 500,
                body: "unavailable".to_string(),
            });
        }
        Ok(())
    }
}

/// Observer that keeps every event it sees.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn logs(&self) -> Vec<String> {
        self.events().into_iter().map(|event| event.log).collect()
    }

    pub fn terminal(&self) -> Vec<ProgressEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.kind.is_terminal())
            .collect()
    }
}

#[async_trait]
impl Observer for RecordingObserver {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn listen(&self, event: &ProgressEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Reconcile settings with short waits.
pub fn fast_reconcile_config() -> ReconcileConfig {
    ReconcileConfig {
        conflict_retry_attempts: 5,
        conflict_retry_interval_ms: 10,
        deployment_pod_timeout_secs: 5,
        stateful_set_pod_timeout_secs: 5,
        pod_poll_interval_ms: 100,
        new_pod_list_attempts: 3,
        new_pod_list_delay_ms: 100,
    }
}

pub fn deployment(name: &str, namespace: &str, image: &str) -> Value {
    json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {"name": name, "namespace": namespace, "labels": {"team": "web"}},
        "spec": {
            "replicas": 1,
            "selector": {"matchLabels": {"app": name}},
            "template": {
                "metadata": {"labels": {"app": name}},
                "spec": {"containers": [{"name": "app", "image": image}]}
            }
        }
    })
}

pub fn stateful_set(name: &str, namespace: &str, image: &str) -> Value {
    json!({
        "apiVersion": "apps/v1",
        "kind": "StatefulSet",
        "metadata": {"name": name, "namespace": namespace},
        "spec": {
            "replicas": 1,
            "serviceName": name,
            "selector": {"matchLabels": {"app": name}},
            "template": {
                "metadata": {"labels": {"app": name}},
                "spec": {"containers": [{"name": "db", "image": image}]}
            }
        }
    })
}

pub fn running_pod(name: &str, namespace: &str, labels: Value) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {"name": name, "namespace": namespace, "labels": labels},
        "spec": {"containers": [{"name": "app", "image": "img:v1"}]},
        "status": {"phase": "Running"}
    })
}

pub fn deployment_job(name: &str, images: &[&str]) -> Job {
    serde_json::from_value(json!({
        "step": "deployDev",
        "process_id": "p-1",
        "type": "deployment",
        "name": name,
        "namespace": "dev",
        "images": images,
        "pipeline": {
            "_metadata": {"company_id": "acme"},
            "steps": [{"name": "deployDev", "next": ["jenkins"]}]
        },
        "claim": 1
    }))
    .expect("valid job")
}

pub fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

/// Wait for a condition to be true with timeout
///
/// Polls the predicate every 10ms until it returns true or timeout is reached.
pub async fn wait_for<F>(mut predicate: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
    while tokio::time::Instant::now() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    predicate()
}
