//! Cluster access port: discovery and generic object reads and writes.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::errors::ClusterResult;
use crate::domain::models::WorkloadKind;

/// REST mapping of a resource kind, as reported by API discovery.
///
/// # Example
/// ```
/// use ci_agent::domain::ports::DiscoveredResource;
///
/// let deployments = DiscoveredResource::new("apps", "v1", "Deployment", "deployments", true);
/// assert_eq!(deployments.api_version(), "apps/v1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiscoveredResource {
    /// API group, empty for the core group
    pub group: String,

    /// API version within the group
    pub version: String,

    /// Object kind, e.g. `Deployment`
    pub kind: String,

    /// Plural resource name used in request paths, e.g. `deployments`
    pub plural: String,

    /// Whether objects of this kind live in a namespace
    pub namespaced: bool,
}

impl DiscoveredResource {
    /// Build a mapping from its parts.
    pub fn new(group: &str, version: &str, kind: &str, plural: &str, namespaced: bool) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
            plural: plural.to_string(),
            namespaced,
        }
    }

    /// `group/version`, or just `version` for the core group
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// Well-known mapping of a workload kind.
    ///
    /// Returns `None` for [`WorkloadKind::Unsupported`].
    pub fn for_workload(kind: WorkloadKind) -> Option<Self> {
        match kind {
            WorkloadKind::Deployment => {
                Some(Self::new("apps", "v1", "Deployment", "deployments", true))
            }
            WorkloadKind::StatefulSet => {
                Some(Self::new("apps", "v1", "StatefulSet", "statefulsets", true))
            }
            WorkloadKind::DaemonSet => Some(Self::new("apps", "v1", "DaemonSet", "daemonsets", true)),
            WorkloadKind::Pod => Some(Self::pods()),
            WorkloadKind::Unsupported => None,
        }
    }

    /// Core `v1` pods.
    pub fn pods() -> Self {
        Self::new("", "v1", "Pod", "pods", true)
    }
}

/// Address of one object, or of a collection when `name` is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceTarget {
    /// Kind of the object
    pub resource: DiscoveredResource,

    /// Namespace, ignored for cluster-scoped resources
    pub namespace: String,

    /// Object name, empty for collections
    pub name: String,
}

impl ResourceTarget {
    /// Address `name` in `namespace`.
    pub fn new(resource: DiscoveredResource, namespace: &str, name: &str) -> Self {
        Self {
            resource,
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

/// Cluster API operations used by the reconciler
///
/// Objects cross this boundary as JSON so that descriptors of any kind can be
/// applied. Typed workloads are decoded by the caller.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Resource kinds served for an `apiVersion` (`v1`, `apps/v1`, ...).
    async fn resources_for_group_version(
        &self,
        api_version: &str,
    ) -> ClusterResult<Vec<DiscoveredResource>>;

    async fn get(&self, target: &ResourceTarget) -> ClusterResult<Value>;

    /// Objects in `target.namespace` matching a label selector.
    async fn list(&self, target: &ResourceTarget, label_selector: &str) -> ClusterResult<Vec<Value>>;

    async fn create(&self, target: &ResourceTarget, object: &Value) -> ClusterResult<Value>;

    /// Full replacement, guarded by `metadata.resourceVersion` when present.
    async fn update(&self, target: &ResourceTarget, object: &Value) -> ClusterResult<Value>;

    /// Strategic merge patch.
    async fn patch(&self, target: &ResourceTarget, patch: &Value) -> ClusterResult<Value>;
}
