//! Step life-cycle reporting for finished jobs.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::models::life_cycle::records_for;
use crate::domain::models::{LifeCycleBatch, ProgressEvent};
use crate::domain::ports::{ControlPlane, Endpoint, Observer};

/// Turns terminal events into step life-cycle records.
///
/// A completed step pauses all of its successors so the control plane can
/// schedule them.
pub struct LifeCycleObserver {
    control_plane: Arc<dyn ControlPlane>,
    agent_name: String,
}

impl LifeCycleObserver {
    /// Report records as `agent_name`.
    pub fn new(control_plane: Arc<dyn ControlPlane>, agent_name: impl Into<String>) -> Self {
        Self {
            control_plane,
            agent_name: agent_name.into(),
        }
    }
}

#[async_trait]
impl Observer for LifeCycleObserver {
    fn name(&self) -> &'static str {
        "life_cycle"
    }

    async fn listen(&self, event: &ProgressEvent) {
        let events = records_for(event, &self.agent_name, Utc::now());
        if events.is_empty() {
            return;
        }
        debug!(
            process_id = %event.process_id,
            step = %event.step,
            records = events.len(),
            "publishing life-cycle records"
        );

        let body = match serde_json::to_value(LifeCycleBatch { events }) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "failed to encode life-cycle records");
                return;
            }
        };
        if let Err(e) = self
            .control_plane
            .publish(Endpoint::ProcessLifeCycleEvents, body)
            .await
        {
            warn!(process_id = %event.process_id, error = %e, "failed to publish life-cycle records");
        }
    }
}
