//! Create-or-update of raw descriptors.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::domain::errors::{ClusterError, ReconcileError, ReconcileResult};
use crate::domain::ports::{ClusterApi, DiscoveredResource, ResourceTarget};

/// What happened to one descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyAction {
    Created,
    Updated,
}

/// Resolves descriptor kinds through discovery, caching per `apiVersion`.
pub struct DescriptorApplier<'a> {
    cluster: &'a dyn ClusterApi,
    discovered: HashMap<String, Vec<DiscoveredResource>>,
}

impl<'a> DescriptorApplier<'a> {
    /// An applier with an empty discovery cache.
    pub fn new(cluster: &'a dyn ClusterApi) -> Self {
        Self {
            cluster,
            discovered: HashMap::new(),
        }
    }

    async fn resolve(&mut self, api_version: &str, kind: &str) -> ReconcileResult<DiscoveredResource> {
        if !self.discovered.contains_key(api_version) {
            let resources = self.cluster.resources_for_group_version(api_version).await?;
            self.discovered.insert(api_version.to_string(), resources);
        }
        self.discovered
            .get(api_version)
            .and_then(|resources| resources.iter().find(|resource| resource.kind == kind))
            .cloned()
            .ok_or_else(|| ReconcileError::UnknownKind(kind.to_string()))
    }

    /// Label `descriptor` and create it, falling back to update when it
    /// already exists.
    pub async fn apply(
        &mut self,
        descriptor: &Value,
        labels: &BTreeMap<String, String>,
        default_namespace: &str,
    ) -> ReconcileResult<ApplyAction> {
        let api_version = string_field(descriptor, "apiVersion")?;
        let kind = string_field(descriptor, "kind")?;
        let resource = self.resolve(api_version, kind).await?;

        let mut object = descriptor.clone();
        let metadata = metadata_mut(&mut object)?;
        let name = metadata
            .get("name")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ReconcileError::InvalidDescriptor(format!("{kind} without metadata.name")))?;

        let label_map = metadata
            .entry("labels")
            .or_insert_with(|| Value::Object(Map::new()));
        if !label_map.is_object() {
            *label_map = Value::Object(Map::new());
        }
        if let Value::Object(existing) = label_map {
            for (key, value) in labels {
                existing.insert(key.clone(), Value::from(value.as_str()));
            }
        }

        let namespace = if resource.namespaced {
            let namespace = metadata
                .get("namespace")
                .and_then(Value::as_str)
                .filter(|namespace| !namespace.is_empty())
                .unwrap_or(default_namespace)
                .to_string();
            metadata.insert("namespace".to_string(), Value::from(namespace.as_str()));
            namespace
        } else {
            String::new()
        };

        let target = ResourceTarget::new(resource, &namespace, &name);
        match self.cluster.create(&target, &object).await {
            Ok(_) => {
                debug!(kind, name = %name, namespace = %namespace, "created");
                Ok(ApplyAction::Created)
            }
            Err(ClusterError::AlreadyExists { .. }) => {
                self.cluster.update(&target, &object).await?;
                debug!(kind, name = %name, namespace = %namespace, "updated");
                Ok(ApplyAction::Updated)
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn string_field<'v>(descriptor: &'v Value, field: &str) -> ReconcileResult<&'v str> {
    descriptor
        .get(field)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ReconcileError::InvalidDescriptor(format!("missing {field}")))
}

fn metadata_mut(object: &mut Value) -> ReconcileResult<&mut Map<String, Value>> {
    let Value::Object(fields) = object else {
        return Err(ReconcileError::InvalidDescriptor(
            "descriptor is not an object".to_string(),
        ));
    };
    let metadata = fields
        .entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()));
    metadata
        .as_object_mut()
        .ok_or_else(|| ReconcileError::InvalidDescriptor("metadata is not an object".to_string()))
}

/// `kind/name` of a descriptor for log lines.
pub fn describe(descriptor: &Value) -> String {
    let kind = descriptor.get("kind").and_then(Value::as_str).unwrap_or("?");
    let name = descriptor
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .unwrap_or("?");
    format!("{kind}/{name}")
}
