//! Deployment jobs pulled from the control plane.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Label marking an object as managed by the agent.
pub const MANAGED_LABEL: &str = "klovercloud_ci";
/// Value of [`MANAGED_LABEL`] on managed objects.
pub const MANAGED_LABEL_VALUE: &str = "enabled";

/// Kind of workload a job reconciles after its descriptors are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadKind {
    /// `apps/v1` Deployment.
    Deployment,
    /// `apps/v1` StatefulSet.
    #[serde(alias = "stateful_set")]
    StatefulSet,
    /// `apps/v1` DaemonSet.
    #[serde(alias = "daemon_set")]
    DaemonSet,
    /// Bare `v1` Pod, updated in place.
    Pod,
    /// Any other type string. Descriptors are still applied.
    #[serde(other)]
    Unsupported,
}

impl WorkloadKind {
    /// Kubernetes `kind` of the workload.
    pub const fn as_kind(self) -> &'static str {
        match self {
            Self::Deployment => "Deployment",
            Self::StatefulSet => "StatefulSet",
            Self::DaemonSet => "DaemonSet",
            Self::Pod => "Pod",
            Self::Unsupported => "Unsupported",
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_kind())
    }
}

/// One entry of a job's image list.
///
/// Plain strings map to the container at the same position. The legacy form
/// names the container index explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageSpec {
    /// Image for the container at the entry's position.
    Plain(String),
    /// Image for an explicit container index.
    Indexed {
        /// Container position in the pod template.
        image_index: usize,
        /// Image reference.
        image: String,
    },
}

impl ImageSpec {
    /// Image reference, whichever the form.
    pub fn image(&self) -> &str {
        match self {
            Self::Plain(image) | Self::Indexed { image, .. } => image,
        }
    }
}

/// Container index/image pairs resolved from an ordered image list.
pub fn indexed_images(images: &[ImageSpec]) -> impl Iterator<Item = (usize, &str)> {
    images.iter().enumerate().map(|(position, spec)| match spec {
        ImageSpec::Plain(image) => (position, image.as_str()),
        ImageSpec::Indexed { image_index, image } => (*image_index, image.as_str()),
    })
}

/// Pipeline metadata carried by a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineMetadata {
    /// Owning company.
    #[serde(default, alias = "companyId")]
    pub company_id: String,
}

/// One node of the pipeline step graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStep {
    /// Step name.
    pub name: String,
    /// Steps that run after this one.
    #[serde(default)]
    pub next: Vec<String>,
}

/// Minimal pipeline step graph needed to advance the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    /// Pipeline metadata.
    #[serde(default, rename = "_metadata", alias = "metadata")]
    pub metadata: PipelineMetadata,
    /// Step graph.
    #[serde(default)]
    pub steps: Vec<PipelineStep>,
}

impl Pipeline {
    /// Steps unlocked by the completion of `step`.
    pub fn next_steps(&self, step: &str) -> &[String] {
        self.steps
            .iter()
            .find(|candidate| candidate.name == step)
            .map(|candidate| candidate.next.as_slice())
            .unwrap_or_default()
    }
}

/// A unit of deployment work.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Pipeline step the job belongs to.
    #[serde(default)]
    pub step: String,

    /// Pipeline run the job belongs to.
    #[serde(default, alias = "processId")]
    pub process_id: String,

    /// Raw cluster objects, created or updated in order.
    #[serde(default, deserialize_with = "nullable_vec")]
    pub descriptors: Vec<Value>,

    /// Workload kind, from the `type` field.
    #[serde(default, rename = "type")]
    pub kind: Option<WorkloadKind>,

    /// Workload name. Empty means descriptors only.
    #[serde(default)]
    pub name: String,

    /// Target namespace; `default` when empty.
    #[serde(default)]
    pub namespace: String,

    /// Images to set, in container order.
    #[serde(default, deserialize_with = "nullable_vec")]
    pub images: Vec<ImageSpec>,

    /// Desired replicas. Zero is treated as unset.
    #[serde(default)]
    pub replica: Option<i32>,

    /// Restart every pod even if nothing else changed.
    #[serde(default, alias = "rolloutRestart")]
    pub rollout_restart: bool,

    /// Pipeline step graph.
    #[serde(default)]
    pub pipeline: Option<Pipeline>,

    /// Correlation token echoed in every event.
    #[serde(default)]
    pub claim: i64,
}

fn nullable_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Job {
    /// Owning company from the pipeline metadata, or empty.
    pub fn company_id(&self) -> &str {
        self.pipeline
            .as_ref()
            .map_or("", |pipeline| pipeline.metadata.company_id.as_str())
    }

    /// Replica count to apply, if any.
    pub fn desired_replicas(&self) -> Option<i32> {
        self.replica.filter(|replicas| *replicas > 0)
    }

    /// Namespace of the target workload.
    pub fn target_namespace(&self) -> &str {
        if self.namespace.is_empty() {
            "default"
        } else {
            &self.namespace
        }
    }

    /// Ownership labels stamped on every object the job touches.
    pub fn ownership_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("company".to_string(), self.company_id().to_string()),
            (MANAGED_LABEL.to_string(), MANAGED_LABEL_VALUE.to_string()),
            ("process_id".to_string(), self.process_id.clone()),
            ("claim".to_string(), self.claim.to_string()),
        ])
    }
}

/// Response envelope of the job pull endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobEnvelope {
    /// Jobs handed out; `null` reads as none.
    #[serde(default, deserialize_with = "nullable_vec")]
    pub data: Vec<Job>,
}
