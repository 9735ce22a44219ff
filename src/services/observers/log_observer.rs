//! Log line reporting for every progress event.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::domain::models::ProgressEvent;
use crate::domain::ports::{ControlPlane, Endpoint, Observer};

#[derive(Debug, Serialize)]
struct LogEntry<'a> {
    process_id: &'a str,
    step: &'a str,
    log: &'a str,
    footmark: &'static str,
    claim: i64,
    created_at: DateTime<Utc>,
}

/// Forwards every event's log line to `/logs`.
pub struct LogObserver {
    control_plane: Arc<dyn ControlPlane>,
}

impl LogObserver {
    /// Post through `control_plane`.
    pub fn new(control_plane: Arc<dyn ControlPlane>) -> Self {
        Self { control_plane }
    }
}

#[async_trait]
impl Observer for LogObserver {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn listen(&self, event: &ProgressEvent) {
        let entry = LogEntry {
            process_id: &event.process_id,
            step: &event.step,
            log: &event.log,
            footmark: event.footmark().as_str(),
            claim: event.claim,
            created_at: Utc::now(),
        };
        let body = match serde_json::to_value(&entry) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "failed to encode log entry");
                return;
            }
        };
        if let Err(e) = self.control_plane.publish(Endpoint::Logs, body).await {
            warn!(process_id = %event.process_id, error = %e, "failed to publish log");
        }
    }
}
