//! Reconciliation of deployment jobs into cluster state.
//!
//! A job first has its raw descriptors applied, then the named workload has
//! its images, replicas and labels patched under optimistic concurrency,
//! and finally, when the pod template changed, the agent waits for the
//! replacement pods to run.

pub mod descriptors;
pub mod merge_patch;
pub mod readiness;
pub mod workload;

use backoff::ExponentialBackoff;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Pod;
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::domain::errors::{ReconcileError, ReconcileResult};
use crate::domain::models::{
    EventKind, Footmark, Job, ProgressEvent, ReconcileConfig, WorkloadKind,
};
use crate::domain::ports::{ClusterApi, DiscoveredResource, ResourceTarget};
use crate::services::event_broadcaster::EventBroadcaster;

use descriptors::DescriptorApplier;
use merge_patch::{create_two_way_merge_patch, is_empty_patch};
use readiness::{wait_for_new_pods_running, PodBaseline, ReadinessPolicy};
use workload::{RolloutTracking, Workload};

/// Result of one successful write attempt.
struct PatchOutcome {
    rolls_pods: bool,
    replicas: i32,
    selector: String,
    baseline: PodBaseline,
}

/// Applies jobs to the cluster and reports progress as it goes.
pub struct ResourceReconciler {
    cluster: Arc<dyn ClusterApi>,
    events: Arc<EventBroadcaster>,
    config: ReconcileConfig,
}

impl ResourceReconciler {
    /// Create a reconciler writing through `cluster` and reporting to `events`.
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        events: Arc<EventBroadcaster>,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            cluster,
            events,
            config,
        }
    }

    fn emit(&self, job: &Job, kind: EventKind, log: impl Into<String>) {
        self.events.broadcast(ProgressEvent::for_job(job, kind, log));
    }

    fn warn_event(&self, job: &Job, log: impl Into<String>) {
        self.emit(
            job,
            EventKind::Warning {
                footmark: Footmark::UpdateResource,
            },
            log,
        );
    }

    /// Apply descriptors, then reconcile the named workload.
    ///
    /// Descriptor failures are reported but do not fail the job. Terminal
    /// events are left to the caller.
    #[instrument(skip(self, job), fields(process_id = %job.process_id, step = %job.step, name = %job.name))]
    pub async fn reconcile(&self, job: &Job) -> ReconcileResult<()> {
        self.emit(
            job,
            EventKind::Initializing {
                footmark: Footmark::InitAgentJob,
            },
            "Initializing agent job",
        );

        if let Err(e) = self.apply_descriptors(job).await {
            warn!(error = %e, "descriptor apply incomplete");
        }

        if job.name.is_empty() {
            return Ok(());
        }

        self.emit(
            job,
            EventKind::Processing {
                footmark: Footmark::UpdateResource,
            },
            "Updating resource",
        );

        match job.kind {
            Some(WorkloadKind::Deployment) => self.reconcile_deployment(job).await,
            Some(WorkloadKind::StatefulSet) => self.reconcile_stateful_set(job).await,
            Some(WorkloadKind::DaemonSet) => self.reconcile_daemon_set(job).await,
            Some(WorkloadKind::Pod) => self.reconcile_pod(job).await,
            Some(WorkloadKind::Unsupported) | None => {
                warn!("unsupported resource type, only descriptors were applied");
                self.warn_event(job, "[WARNING] unsupported resource type, skipping update");
                Ok(())
            }
        }
    }

    /// Create-or-update every descriptor of `job`, independently.
    pub async fn apply_descriptors(&self, job: &Job) -> ReconcileResult<()> {
        if job.descriptors.is_empty() {
            return Ok(());
        }

        let labels = job.ownership_labels();
        let mut applier = DescriptorApplier::new(self.cluster.as_ref());
        let mut failed = 0;
        for descriptor in &job.descriptors {
            let described = descriptors::describe(descriptor);
            match applier
                .apply(descriptor, &labels, job.target_namespace())
                .await
            {
                Ok(action) => info!(descriptor = %described, ?action, "descriptor applied"),
                Err(e) => {
                    failed += 1;
                    warn!(descriptor = %described, error = %e, "descriptor apply failed");
                    self.warn_event(job, format!("[WARNING] Failed to apply {described}: {e}"));
                }
            }
        }

        if failed > 0 {
            return Err(ReconcileError::DescriptorsFailed {
                failed,
                total: job.descriptors.len(),
            });
        }
        Ok(())
    }

    /// Patch a deployment and wait for the pods of its new replica set.
    pub async fn reconcile_deployment(&self, job: &Job) -> ReconcileResult<()> {
        self.reconcile_workload::<Deployment>(
            job,
            Duration::from_secs(self.config.deployment_pod_timeout_secs),
        )
        .await
    }

    /// Patch a stateful set. Replaced pods keep their names, so they are
    /// told apart by resource version.
    pub async fn reconcile_stateful_set(&self, job: &Job) -> ReconcileResult<()> {
        self.reconcile_workload::<StatefulSet>(
            job,
            Duration::from_secs(self.config.stateful_set_pod_timeout_secs),
        )
        .await
    }

    /// Patch a daemon set without waiting on its pods.
    pub async fn reconcile_daemon_set(&self, job: &Job) -> ReconcileResult<()> {
        self.reconcile_workload::<DaemonSet>(job, Duration::ZERO).await
    }

    /// Update a bare pod's images in place.
    pub async fn reconcile_pod(&self, job: &Job) -> ReconcileResult<()> {
        self.emit(
            job,
            EventKind::Initializing {
                footmark: Footmark::UpdateResource,
            },
            "Initiating pod update ...",
        );
        let target =
            ResourceTarget::new(DiscoveredResource::pods(), job.target_namespace(), &job.name);
        let target = &target;

        self.retry_on_conflict(move || async move {
            self.emit(
                job,
                EventKind::Processing {
                    footmark: Footmark::UpdateResource,
                },
                format!("Applying Pod: {}", job.name),
            );
            let current = self.fetch(target).await?;
            let fetched: Pod = decode(WorkloadKind::Pod, &current)?;
            let mut pod = fetched.clone();
            let spec = pod.spec.get_or_insert_with(Default::default);
            for image in workload::set_images(&mut spec.containers, &job.images) {
                self.warn_event(job, index_warning(&image));
            }
            let updated = encode(WorkloadKind::Pod, &pod)?;
            if updated == encode(WorkloadKind::Pod, &fetched)? {
                info!(name = %job.name, "pod already up to date");
                return Ok(());
            }
            self.cluster.update(target, &updated).await?;
            Ok(())
        })
        .await?;

        self.emit(
            job,
            EventKind::Processing {
                footmark: Footmark::UpdateResource,
            },
            "Updated Successfully",
        );
        Ok(())
    }

    async fn reconcile_workload<W: Workload>(
        &self,
        job: &Job,
        pod_timeout: Duration,
    ) -> ReconcileResult<()> {
        let kind = W::KIND;
        self.emit(
            job,
            EventKind::Initializing {
                footmark: Footmark::UpdateResource,
            },
            format!("Initiating {} ...", kind.as_kind().to_lowercase()),
        );
        let resource = DiscoveredResource::for_workload(kind)
            .ok_or_else(|| ReconcileError::UnknownKind(kind.to_string()))?;
        let target = ResourceTarget::new(resource, job.target_namespace(), &job.name);
        let target = &target;

        let outcome = self
            .retry_on_conflict(move || self.patch_workload::<W>(job, target))
            .await?;

        if outcome.rolls_pods && outcome.replicas > 0 && W::TRACKING != RolloutTracking::None {
            self.emit(
                job,
                EventKind::Processing {
                    footmark: Footmark::UpdateResource,
                },
                "Waiting until pod is ready!",
            );
            let policy = ReadinessPolicy {
                per_pod_timeout: pod_timeout,
                poll_interval: Duration::from_millis(self.config.pod_poll_interval_ms),
                list_attempts: self.config.new_pod_list_attempts,
                list_delay: Duration::from_millis(self.config.new_pod_list_delay_ms),
            };
            wait_for_new_pods_running(
                self.cluster.as_ref(),
                job.target_namespace(),
                &outcome.selector,
                &outcome.baseline,
                &policy,
            )
            .await?;
        }

        self.emit(
            job,
            EventKind::Processing {
                footmark: Footmark::UpdateResource,
            },
            "Updated Successfully",
        );
        Ok(())
    }

    /// One fetch-modify-patch attempt.
    async fn patch_workload<W: Workload>(
        &self,
        job: &Job,
        target: &ResourceTarget,
    ) -> ReconcileResult<PatchOutcome> {
        let kind = W::KIND;
        self.emit(
            job,
            EventKind::Processing {
                footmark: Footmark::UpdateResource,
            },
            format!("Applying {kind}: {}", job.name),
        );

        let current = self.fetch(target).await?;
        let fetched: W = decode(kind, &current)?;
        let mut modified = fetched.clone();

        let containers = workload::containers_mut(modified.template_mut());
        for image in workload::set_images(containers, &job.images) {
            self.warn_event(job, index_warning(&image));
        }

        let selector = workload::template_selector(&fetched);
        let baseline = if W::TRACKING == RolloutTracking::None {
            PodBaseline::empty(W::TRACKING)
        } else {
            let pods = ResourceTarget::new(DiscoveredResource::pods(), &target.namespace, "");
            match self.cluster.list(&pods, &selector).await {
                Ok(existing) => PodBaseline::capture(W::TRACKING, &existing),
                Err(e) => {
                    warn!(error = %e, "failed to list existing pods");
                    self.warn_event(job, "[WARNING]Failed to list Existing Pods!");
                    PodBaseline::empty(W::TRACKING)
                }
            }
        };

        workload::merge_labels(modified.metadata_mut(), &job.ownership_labels());
        workload::mark_template_managed(modified.template_mut());
        if let Some(replicas) = job.desired_replicas() {
            modified.set_replicas(replicas);
        }
        if job.rollout_restart {
            workload::request_restart(&mut modified);
        }

        let original = encode(kind, &fetched)?;
        let mut patch = create_two_way_merge_patch(&original, &encode(kind, &modified)?);
        let written = !is_empty_patch(&patch);
        let rolls_pods = patch.pointer("/spec/template").is_some();
        if written {
            if let (Some(fields), Some(version)) = (
                patch.as_object_mut(),
                current.pointer("/metadata/resourceVersion").cloned(),
            ) {
                let metadata = fields
                    .entry("metadata")
                    .or_insert_with(|| Value::Object(serde_json::Map::new()));
                if let Some(metadata) = metadata.as_object_mut() {
                    metadata.insert("resourceVersion".to_string(), version);
                }
            }
            self.cluster.patch(target, &patch).await?;
            info!(%kind, name = %job.name, "patched");
        } else {
            info!(%kind, name = %job.name, "already up to date, nothing to patch");
        }

        Ok(PatchOutcome {
            rolls_pods,
            replicas: modified.replicas(),
            selector,
            baseline,
        })
    }

    async fn fetch(&self, target: &ResourceTarget) -> ReconcileResult<Value> {
        self.cluster
            .get(target)
            .await
            .map_err(|source| ReconcileError::Fetch {
                kind: target.resource.kind.clone(),
                source,
            })
    }

    /// Run `attempt` until it stops hitting write conflicts or the retry
    /// budget is spent. Any other error ends the loop at once.
    async fn retry_on_conflict<T, F, Fut>(&self, mut attempt: F) -> ReconcileResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = ReconcileResult<T>>,
    {
        let max_attempts = self.config.conflict_retry_attempts.max(1);
        let interval = Duration::from_millis(self.config.conflict_retry_interval_ms);
        let policy = ExponentialBackoff {
            initial_interval: interval,
            current_interval: interval,
            max_interval: interval,
            multiplier: 1.0,
            randomization_factor: 0.1,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        };
        let attempts = AtomicU32::new(0);
        let attempts = &attempts;

        backoff::future::retry(policy, || {
            let fut = attempt();
            async move {
                let made = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                match fut.await {
                    Ok(value) => Ok(value),
                    Err(ReconcileError::Cluster(source)) if source.is_conflict() => {
                        if made < max_attempts {
                            warn!(attempt = made, error = %source, "write conflict, retrying");
                            Err(backoff::Error::transient(ReconcileError::Cluster(source)))
                        } else {
                            Err(backoff::Error::permanent(ReconcileError::Conflict {
                                attempts: made,
                                source,
                            }))
                        }
                    }
                    Err(e) => Err(backoff::Error::permanent(e)),
                }
            }
        })
        .await
    }
}

fn index_warning(image: &str) -> String {
    format!("[WARNING] index out of bound! ignoring container for {image}")
}

fn decode<T: serde::de::DeserializeOwned>(kind: WorkloadKind, value: &Value) -> ReconcileResult<T> {
    serde_json::from_value(value.clone()).map_err(|e| ReconcileError::Decode {
        kind: kind.to_string(),
        message: e.to_string(),
    })
}

fn encode<T: serde::Serialize>(kind: WorkloadKind, object: &T) -> ReconcileResult<Value> {
    serde_json::to_value(object).map_err(|e| ReconcileError::Decode {
        kind: kind.to_string(),
        message: e.to_string(),
    })
}
