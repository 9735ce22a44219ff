//! Process event reporting with the full event data.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

use crate::domain::models::ProgressEvent;
use crate::domain::ports::{ControlPlane, Endpoint, Observer};

/// Forwards the full event data to `/processes_events`.
pub struct ProcessObserver {
    control_plane: Arc<dyn ControlPlane>,
}

impl ProcessObserver {
    /// Post through `control_plane`.
    pub fn new(control_plane: Arc<dyn ControlPlane>) -> Self {
        Self { control_plane }
    }
}

#[async_trait]
impl Observer for ProcessObserver {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn listen(&self, event: &ProgressEvent) {
        let body = json!({
            "process_id": event.process_id,
            "company_id": event.company_id,
            "data": Value::Object(event.event_data()),
        });
        if let Err(e) = self.control_plane.publish(Endpoint::ProcessEvents, body).await {
            warn!(process_id = %event.process_id, error = %e, "failed to publish process event");
        }
    }
}
