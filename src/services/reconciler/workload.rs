//! Typed access to the parts of a workload the reconciler changes.

use chrono::{SecondsFormat, Utc};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::models::{ImageSpec, WorkloadKind, MANAGED_LABEL, MANAGED_LABEL_VALUE};

/// Annotation whose change makes the controller restart every pod.
pub const RESTARTED_AT_ANNOTATION: &str = "kubectl.kubernetes.io/restartedAt";

/// How replacement pods are told apart from the ones present before a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloutTracking {
    /// Replacement pods get new names.
    ByPodName,
    /// Pods keep their names and are recognised by a new resourceVersion.
    ByResourceVersion,
    /// No readiness wait.
    None,
}

/// A controller-managed workload with a pod template.
pub trait Workload: Serialize + DeserializeOwned + Clone + Send + Sync {
    /// Job type this workload is reconciled for.
    const KIND: WorkloadKind;
    /// How its replacement pods are recognised.
    const TRACKING: RolloutTracking;

    /// Object metadata.
    fn metadata_mut(&mut self) -> &mut ObjectMeta;

    /// Pod template, if the spec is present.
    fn template(&self) -> Option<&PodTemplateSpec>;

    /// Pod template, creating an empty spec if needed.
    fn template_mut(&mut self) -> &mut PodTemplateSpec;

    /// Configured replica count, with the API default of 1 when unset.
    fn replicas(&self) -> i32 {
        1
    }

    /// Set the replica count. Kinds without one ignore it.
    fn set_replicas(&mut self, _replicas: i32) {}
}

impl Workload for Deployment {
    const KIND: WorkloadKind = WorkloadKind::Deployment;
    const TRACKING: RolloutTracking = RolloutTracking::ByPodName;

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn template(&self) -> Option<&PodTemplateSpec> {
        self.spec.as_ref().map(|spec| &spec.template)
    }

    fn template_mut(&mut self) -> &mut PodTemplateSpec {
        &mut self.spec.get_or_insert_with(Default::default).template
    }

    fn replicas(&self) -> i32 {
        self.spec
            .as_ref()
            .and_then(|spec| spec.replicas)
            .unwrap_or(1)
    }

    fn set_replicas(&mut self, replicas: i32) {
        self.spec.get_or_insert_with(Default::default).replicas = Some(replicas);
    }
}

impl Workload for StatefulSet {
    const KIND: WorkloadKind = WorkloadKind::StatefulSet;
    const TRACKING: RolloutTracking = RolloutTracking::ByResourceVersion;

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn template(&self) -> Option<&PodTemplateSpec> {
        self.spec.as_ref().map(|spec| &spec.template)
    }

    fn template_mut(&mut self) -> &mut PodTemplateSpec {
        &mut self.spec.get_or_insert_with(Default::default).template
    }

    fn replicas(&self) -> i32 {
        self.spec
            .as_ref()
            .and_then(|spec| spec.replicas)
            .unwrap_or(1)
    }

    fn set_replicas(&mut self, replicas: i32) {
        self.spec.get_or_insert_with(Default::default).replicas = Some(replicas);
    }
}

impl Workload for DaemonSet {
    const KIND: WorkloadKind = WorkloadKind::DaemonSet;
    const TRACKING: RolloutTracking = RolloutTracking::None;

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn template(&self) -> Option<&PodTemplateSpec> {
        self.spec.as_ref().map(|spec| &spec.template)
    }

    fn template_mut(&mut self) -> &mut PodTemplateSpec {
        &mut self.spec.get_or_insert_with(Default::default).template
    }
}

/// Label selector string (`k=v,k2=v2`) built from the pod template labels.
pub fn template_selector<W: Workload>(workload: &W) -> String {
    workload
        .template()
        .and_then(|template| template.metadata.as_ref())
        .and_then(|metadata| metadata.labels.as_ref())
        .map(|labels| {
            labels
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect::<Vec<_>>()
                .join(",")
        })
        .unwrap_or_default()
}

/// Set images by container index.
///
/// Returns the images whose index is outside the container list; those are
/// left untouched.
pub fn set_images(containers: &mut [Container], images: &[ImageSpec]) -> Vec<String> {
    let mut skipped = Vec::new();
    for (index, image) in crate::domain::models::job::indexed_images(images) {
        match containers.get_mut(index) {
            Some(container) => container.image = Some(image.to_string()),
            None => skipped.push(image.to_string()),
        }
    }
    skipped
}

/// Containers of a pod spec, creating an empty spec if needed.
pub fn containers_mut(template: &mut PodTemplateSpec) -> &mut Vec<Container> {
    &mut template
        .spec
        .get_or_insert_with(PodSpec::default)
        .containers
}

/// Merge `labels` into object labels, keeping any other labels.
pub fn merge_labels(metadata: &mut ObjectMeta, labels: &BTreeMap<String, String>) {
    metadata
        .labels
        .get_or_insert_with(BTreeMap::new)
        .extend(labels.iter().map(|(k, v)| (k.clone(), v.clone())));
}

/// Mark the pod template as agent-managed.
pub fn mark_template_managed(template: &mut PodTemplateSpec) {
    let metadata = template.metadata.get_or_insert_with(ObjectMeta::default);
    metadata
        .labels
        .get_or_insert_with(BTreeMap::new)
        .insert(MANAGED_LABEL.to_string(), MANAGED_LABEL_VALUE.to_string());
}

/// Stamp the workload and its template with the current time so every pod
/// is replaced.
pub fn request_restart<W: Workload>(workload: &mut W) {
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    let annotate = |metadata: &mut ObjectMeta| {
        metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(RESTARTED_AT_ANNOTATION.to_string(), now.clone());
    };
    annotate(workload.metadata_mut());
    annotate(
        workload
            .template_mut()
            .metadata
            .get_or_insert_with(ObjectMeta::default),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn deployment() -> Deployment {
        serde_json::from_value(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "svc", "labels": {"team": "web"}},
            "spec": {
                "selector": {"matchLabels": {"app": "svc"}},
                "template": {
                    "metadata": {"labels": {"app": "svc", "tier": "fe"}},
                    "spec": {"containers": [{"name": "app", "image": "img:v1"}]}
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn selector_joins_template_labels() {
        assert_eq!(template_selector(&deployment()), "app=svc,tier=fe");
    }

    #[test]
    fn replicas_default_to_one() {
        let mut deployment = deployment();
        assert_eq!(deployment.replicas(), 1);
        deployment.set_replicas(3);
        assert_eq!(deployment.replicas(), 3);
    }

    #[test]
    fn labels_are_merged_not_replaced() {
        let mut deployment = deployment();
        let labels = BTreeMap::from([("process_id".to_string(), "p-1".to_string())]);
        merge_labels(deployment.metadata_mut(), &labels);
        let merged = deployment.metadata.labels.unwrap();
        assert_eq!(merged["team"], "web");
        assert_eq!(merged["process_id"], "p-1");
    }

    #[test]
    fn restart_stamps_object_and_template() {
        let mut deployment = deployment();
        request_restart(&mut deployment);
        let template = deployment
            .template()
            .and_then(|t| t.metadata.as_ref())
            .and_then(|m| m.annotations.as_ref())
            .unwrap();
        let object = deployment.metadata.annotations.as_ref().unwrap();
        assert!(template.contains_key(RESTARTED_AT_ANNOTATION));
        assert_eq!(
            object.get(RESTARTED_AT_ANNOTATION),
            template.get(RESTARTED_AT_ANNOTATION)
        );
    }

    proptest! {
        #[test]
        fn in_range_images_applied_and_rest_skipped(
            container_count in 0usize..5,
            image_count in 0usize..8,
        ) {
            let mut containers: Vec<Container> = (0..container_count)
                .map(|i| Container { name: format!("c{i}"), image: Some("old".to_string()), ..Container::default() })
                .collect();
            let images: Vec<ImageSpec> = (0..image_count)
                .map(|i| ImageSpec::Plain(format!("new:{i}")))
                .collect();

            let skipped = set_images(&mut containers, &images);

            prop_assert_eq!(skipped.len(), image_count.saturating_sub(container_count));
            for (i, container) in containers.iter().enumerate() {
                let expected = if i < image_count { format!("new:{i}") } else { "old".to_string() };
                prop_assert_eq!(container.image.as_deref(), Some(expected.as_str()));
            }
        }
    }
}
