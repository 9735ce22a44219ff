//! Concurrency-gated polling of the control plane for jobs.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, instrument, warn};

use crate::domain::models::{EventKind, Job, ProgressEvent, PullerConfig};
use crate::domain::ports::ControlPlane;
use crate::services::event_broadcaster::EventBroadcaster;
use crate::services::reconciler::ResourceReconciler;

/// Pulls jobs and runs at most `pull_size` reconciliations at a time.
pub struct JobPuller {
    control_plane: Arc<dyn ControlPlane>,
    reconciler: Arc<ResourceReconciler>,
    events: Arc<EventBroadcaster>,
    semaphore: Arc<Semaphore>,
    pull_size: usize,
    poll_interval: Duration,
}

impl JobPuller {
    /// Create a puller with `config.pull_size` permits.
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        reconciler: Arc<ResourceReconciler>,
        events: Arc<EventBroadcaster>,
        config: &PullerConfig,
    ) -> Self {
        Self {
            control_plane,
            reconciler,
            events,
            semaphore: Arc::new(Semaphore::new(config.pull_size)),
            pull_size: config.pull_size,
            poll_interval: config.poll_interval(),
        }
    }

    /// Number of jobs currently being reconciled.
    pub fn in_flight(&self) -> usize {
        self.pull_size
            .saturating_sub(self.semaphore.available_permits())
    }

    /// One polling round. Returns how many jobs were handed out.
    ///
    /// Nothing is fetched while every permit is taken. Jobs beyond the free
    /// permits wait for one instead of raising the ceiling.
    pub async fn pull(&self) -> usize {
        let available = self.semaphore.available_permits();
        if available < 1 {
            debug!(pull_size = self.pull_size, "all permits taken, skipping pull");
            return 0;
        }

        let jobs = match self.control_plane.fetch_jobs(available).await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(error = %e, "failed to pull jobs");
                return 0;
            }
        };
        if jobs.is_empty() {
            return 0;
        }
        info!(count = jobs.len(), available, "pulled jobs");

        let count = jobs.len();
        for job in jobs {
            let reconciler = Arc::clone(&self.reconciler);
            let events = Arc::clone(&self.events);
            match Arc::clone(&self.semaphore).try_acquire_owned() {
                Ok(permit) => {
                    tokio::spawn(dispatch(reconciler, events, job, permit));
                }
                Err(_) => {
                    debug!(process_id = %job.process_id, "no free permit, job queued");
                    let semaphore = Arc::clone(&self.semaphore);
                    tokio::spawn(async move {
                        match semaphore.acquire_owned().await {
                            Ok(permit) => dispatch(reconciler, events, job, permit).await,
                            Err(e) => error!(process_id = %job.process_id, error = %e, "job dropped"),
                        }
                    });
                }
            }
        }
        count
    }

    /// Poll until `shutdown` fires.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            pull_size = self.pull_size,
            interval_ms = self.poll_interval.as_millis() as u64,
            "job puller started"
        );
        loop {
            self.pull().await;
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown.recv() => {
                    info!(in_flight = self.in_flight(), "job puller shutting down");
                    break;
                }
            }
        }
    }
}

/// Reconcile `job`, release its permit and emit its one terminal event.
#[instrument(skip_all, fields(process_id = %job.process_id, step = %job.step))]
pub async fn dispatch(
    reconciler: Arc<ResourceReconciler>,
    events: Arc<EventBroadcaster>,
    job: Job,
    permit: OwnedSemaphorePermit,
) {
    let result = reconciler.reconcile(&job).await;
    drop(permit);

    let event = match result {
        Ok(()) => {
            info!("job completed");
            ProgressEvent::for_job(&job, EventKind::Successful, "Agent Job Completed")
        }
        Err(e) => {
            error!(error = %e, "job failed");
            let reason = e.to_string();
            ProgressEvent::for_job(
                &job,
                EventKind::Failed {
                    reason: reason.clone(),
                },
                format!("Update Failed: {reason}"),
            )
        }
    };
    events.broadcast(event);
}
