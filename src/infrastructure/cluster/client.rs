//! Dynamic cluster access through `kube`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::APIResourceList;
use kube::api::{
    Api, ApiResource, DynamicObject, GroupVersionKind, ListParams, Patch, PatchParams, PostParams,
};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use serde_json::Value;
use tracing::debug;

use crate::domain::errors::{ClusterError, ClusterResult};
use crate::domain::models::ClusterConfig;
use crate::domain::ports::{ClusterApi, DiscoveredResource, ResourceTarget};

/// Build a client from an explicit kubeconfig, or from in-cluster / default
/// credentials when none is configured.
pub async fn connect(config: &ClusterConfig) -> Result<Client> {
    match &config.kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
            let config =
                kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .context("Failed to load kubeconfig")?;
            Client::try_from(config).context("Failed to build cluster client")
        }
        None => Client::try_default()
            .await
            .context("Failed to build cluster client from default credentials"),
    }
}

/// [`ClusterApi`] over `kube::Api<DynamicObject>`.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    /// Wrap a connected client.
    pub const fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, target: &ResourceTarget) -> Api<DynamicObject> {
        let resource = &target.resource;
        let gvk = GroupVersionKind::gvk(&resource.group, &resource.version, &resource.kind);
        let api_resource = ApiResource::from_gvk_with_plural(&gvk, &resource.plural);
        if resource.namespaced {
            Api::namespaced_with(self.client.clone(), &target.namespace, &api_resource)
        } else {
            Api::all_with(self.client.clone(), &api_resource)
        }
    }
}

fn map_error(target: &ResourceTarget, err: kube::Error) -> ClusterError {
    let kind = target.resource.kind.clone();
    let name = target.name.clone();
    match err {
        kube::Error::Api(response) => match (response.code, response.reason.as_str()) {
            (404, _) => ClusterError::NotFound { kind, name },
            (409, "AlreadyExists") => ClusterError::AlreadyExists { kind, name },
            (409, _) => ClusterError::Conflict {
                kind,
                name,
                message: response.message.clone(),
            },
            (code, _) => ClusterError::Api {
                code,
                message: response.message.clone(),
            },
        },
        other => ClusterError::Transport(other.to_string()),
    }
}

fn to_value(object: &DynamicObject) -> ClusterResult<Value> {
    serde_json::to_value(object).map_err(|e| ClusterError::Decode(e.to_string()))
}

fn from_value(object: &Value) -> ClusterResult<DynamicObject> {
    serde_json::from_value(object.clone()).map_err(|e| ClusterError::Decode(e.to_string()))
}

fn discovered(api_version: &str, list: APIResourceList) -> Vec<DiscoveredResource> {
    let (group, version) = api_version
        .split_once('/')
        .unwrap_or(("", api_version));
    list.resources
        .into_iter()
        // Subresources such as `deployments/scale` are not addressable kinds.
        .filter(|resource| !resource.name.contains('/'))
        .map(|resource| DiscoveredResource {
            group: group.to_string(),
            version: version.to_string(),
            kind: resource.kind,
            plural: resource.name,
            namespaced: resource.namespaced,
        })
        .collect()
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn resources_for_group_version(
        &self,
        api_version: &str,
    ) -> ClusterResult<Vec<DiscoveredResource>> {
        let list = if api_version.contains('/') {
            self.client.list_api_group_resources(api_version).await
        } else {
            self.client.list_core_api_resources(api_version).await
        }
        .map_err(|e| ClusterError::Transport(e.to_string()))?;
        debug!(api_version, kinds = list.resources.len(), "discovered resources");
        Ok(discovered(api_version, list))
    }

    async fn get(&self, target: &ResourceTarget) -> ClusterResult<Value> {
        let object = self
            .api(target)
            .get(&target.name)
            .await
            .map_err(|e| map_error(target, e))?;
        to_value(&object)
    }

    async fn list(&self, target: &ResourceTarget, label_selector: &str) -> ClusterResult<Vec<Value>> {
        let params = ListParams::default().labels(label_selector);
        let list = self
            .api(target)
            .list(&params)
            .await
            .map_err(|e| map_error(target, e))?;
        list.items.iter().map(to_value).collect()
    }

    async fn create(&self, target: &ResourceTarget, object: &Value) -> ClusterResult<Value> {
        let created = self
            .api(target)
            .create(&PostParams::default(), &from_value(object)?)
            .await
            .map_err(|e| map_error(target, e))?;
        to_value(&created)
    }

    async fn update(&self, target: &ResourceTarget, object: &Value) -> ClusterResult<Value> {
        let api = self.api(target);
        let mut object = from_value(object)?;
        if object.metadata.resource_version.is_none() {
            // Replace requires the current resourceVersion.
            let current = api
                .get(&target.name)
                .await
                .map_err(|e| map_error(target, e))?;
            object.metadata.resource_version = current.metadata.resource_version;
        }
        let updated = api
            .replace(&target.name, &PostParams::default(), &object)
            .await
            .map_err(|e| map_error(target, e))?;
        to_value(&updated)
    }

    async fn patch(&self, target: &ResourceTarget, patch: &Value) -> ClusterResult<Value> {
        let patched = self
            .api(target)
            .patch(&target.name, &PatchParams::default(), &Patch::Strategic(patch))
            .await
            .map_err(|e| map_error(target, e))?;
        to_value(&patched)
    }
}
