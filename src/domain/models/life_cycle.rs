//! Life-cycle records that advance or halt pipeline steps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::{ProcessStatus, ProgressEvent};

/// Status of a pipeline step as recorded by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifeCycleStatus {
    /// The step finished.
    Completed,
    /// The step failed.
    Failed,
    /// The step waits for a predecessor.
    Paused,
}

/// Status change of one pipeline step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifeCycleRecord {
    /// Pipeline run.
    pub process_id: String,
    /// Step whose status changes.
    pub step: String,
    /// New status.
    pub status: LifeCycleStatus,
    /// Successors of a completed step.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next: Vec<String>,
    /// Agent reporting the change.
    pub agent: String,
    /// When the change was recorded.
    pub created_at: DateTime<Utc>,
}

/// Request body of the life-cycle endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifeCycleBatch {
    /// Records to store.
    pub events: Vec<LifeCycleRecord>,
}

/// Records produced by a progress event.
///
/// Failures mark the current step failed. Success completes the current step
/// and pauses every successor named in the pipeline graph. Everything else
/// yields nothing.
pub fn records_for(event: &ProgressEvent, agent: &str, now: DateTime<Utc>) -> Vec<LifeCycleRecord> {
    let record = |step: &str, status| LifeCycleRecord {
        process_id: event.process_id.clone(),
        step: step.to_string(),
        status,
        next: Vec::new(),
        agent: agent.to_string(),
        created_at: now,
    };

    match event.status() {
        Some(ProcessStatus::Failed | ProcessStatus::Error | ProcessStatus::Terminating) => {
            vec![record(&event.step, LifeCycleStatus::Failed)]
        }
        Some(ProcessStatus::Successful) => {
            let successors = event
                .pipeline
                .as_ref()
                .map(|pipeline| pipeline.next_steps(&event.step))
                .unwrap_or_default();
            std::iter::once(record(&event.step, LifeCycleStatus::Completed))
                .chain(
                    successors
                        .iter()
                        .map(|next| record(next, LifeCycleStatus::Paused)),
                )
                .collect()
        }
        _ => Vec::new(),
    }
}
