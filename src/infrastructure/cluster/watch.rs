//! Label-filtered watchers over agent-managed object kinds.

use futures::TryStreamExt;
use kube::api::{Api, ApiResource, DynamicObject, GroupVersionKind};
use kube::runtime::{watcher, WatchStreamExt};
use kube::Client;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::models::MANAGED_LABEL;

/// What a watcher saw happen to one object.
#[derive(Debug, Clone, PartialEq)]
pub enum ObservedChange {
    /// The object was created or changed.
    Applied(Value),
    /// The object was removed.
    Deleted(Value),
    /// The watch is listing every object again after a (re)start.
    RelistStarted,
    /// The relist is complete; objects it did not return are gone.
    RelistDone,
}

/// A change tagged with the object type reported upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchedObject {
    /// Object type name used in the `extras` of kube events.
    pub object_type: &'static str,
    /// What happened.
    pub change: ObservedChange,
}

/// `(object type, group, version, kind, plural)` of every watched kind.
const WATCHED_KINDS: &[(&str, &str, &str, &str, &str)] = &[
    ("namespace", "", "v1", "Namespace", "namespaces"),
    ("service", "", "v1", "Service", "services"),
    ("pod", "", "v1", "Pod", "pods"),
    ("deployment", "apps", "v1", "Deployment", "deployments"),
    ("ingress", "networking.k8s.io", "v1", "Ingress", "ingresses"),
    ("networkPolicy", "networking.k8s.io", "v1", "NetworkPolicy", "networkpolicies"),
    ("clusterRoleBinding", "rbac.authorization.k8s.io", "v1", "ClusterRoleBinding", "clusterrolebindings"),
    ("clusterRole", "rbac.authorization.k8s.io", "v1", "ClusterRole", "clusterroles"),
    ("roleBinding", "rbac.authorization.k8s.io", "v1", "RoleBinding", "rolebindings"),
    ("role", "rbac.authorization.k8s.io", "v1", "Role", "roles"),
    ("serviceAccount", "", "v1", "ServiceAccount", "serviceaccounts"),
    ("secret", "", "v1", "Secret", "secrets"),
    ("configMap", "", "v1", "ConfigMap", "configmaps"),
    ("pvc", "", "v1", "PersistentVolumeClaim", "persistentvolumeclaims"),
    ("persistentVolume", "", "v1", "PersistentVolume", "persistentvolumes"),
    ("daemonSet", "apps", "v1", "DaemonSet", "daemonsets"),
    ("replicaSet", "apps", "v1", "ReplicaSet", "replicasets"),
    ("statefulSet", "apps", "v1", "StatefulSet", "statefulsets"),
];

/// Spawn one watcher per managed kind, forwarding changes to `tx` until
/// shutdown is signalled or the receiver is dropped.
pub fn spawn_label_watchers(
    client: &Client,
    tx: &mpsc::Sender<WatchedObject>,
    shutdown: &broadcast::Sender<()>,
) -> Vec<JoinHandle<()>> {
    WATCHED_KINDS
        .iter()
        .map(|&(object_type, group, version, kind, plural)| {
            let gvk = GroupVersionKind::gvk(group, version, kind);
            let resource = ApiResource::from_gvk_with_plural(&gvk, plural);
            let api: Api<DynamicObject> = Api::all_with(client.clone(), &resource);
            tokio::spawn(watch_kind(
                api,
                object_type,
                tx.clone(),
                shutdown.subscribe(),
            ))
        })
        .collect()
}

async fn watch_kind(
    api: Api<DynamicObject>,
    object_type: &'static str,
    tx: mpsc::Sender<WatchedObject>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let config = watcher::Config::default().labels(MANAGED_LABEL);
    let mut stream = Box::pin(watcher(api, config).default_backoff());
    info!(object_type, "watching managed objects");

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            next = stream.try_next() => {
                let change = match next {
                    Ok(Some(watcher::Event::Apply(object) | watcher::Event::InitApply(object))) => {
                        serde_json::to_value(&object).map(ObservedChange::Applied)
                    }
                    Ok(Some(watcher::Event::Delete(object))) => {
                        serde_json::to_value(&object).map(ObservedChange::Deleted)
                    }
                    Ok(Some(watcher::Event::Init)) => Ok(ObservedChange::RelistStarted),
                    Ok(Some(watcher::Event::InitDone)) => Ok(ObservedChange::RelistDone),
                    Ok(None) => break,
                    Err(e) => {
                        warn!(object_type, error = %e, "watch stream error");
                        continue;
                    }
                };
                let change = match change {
                    Ok(change) => change,
                    Err(e) => {
                        warn!(object_type, error = %e, "failed to encode watched object");
                        continue;
                    }
                };
                if tx.send(WatchedObject { object_type, change }).await.is_err() {
                    break;
                }
            }
        }
    }
    debug!(object_type, "watcher stopped");
}
