//! Publishing change notifications for agent-managed cluster objects.

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::domain::models::{KubeEventCommand, KubeEventMessage};
use crate::domain::ports::{ControlPlane, Endpoint};
use crate::infrastructure::cluster::{ObservedChange, WatchedObject};

/// One change to report upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedChange {
    /// ADD, UPDATE or DELETE.
    pub command: KubeEventCommand,
    /// Previous revision, for updates.
    pub old: Option<Value>,
    /// The object as last seen.
    pub current: Value,
}

#[derive(Debug)]
struct Tracked {
    object_type: &'static str,
    object: Value,
}

/// Last seen revision of every live object, keyed by uid.
///
/// While a watch relists, the uids it returns are collected. When the relist
/// completes, tracked objects of that type it did not return are reported as
/// deleted and forgotten.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    seen: HashMap<String, Tracked>,
    relisting: HashMap<&'static str, HashSet<String>>,
}

impl ChangeTracker {
    /// An empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify a watched change into the events to report.
    ///
    /// Objects without a uid are always reported as additions and never
    /// tracked.
    pub fn classify(&mut self, watched: &WatchedObject) -> Vec<ClassifiedChange> {
        let object_type = watched.object_type;
        match &watched.change {
            ObservedChange::Applied(object) => {
                let Some(uid) = uid(object) else {
                    return vec![change(KubeEventCommand::Add, None, object.clone())];
                };
                if let Some(listed) = self.relisting.get_mut(object_type) {
                    listed.insert(uid.clone());
                }
                let tracked = Tracked {
                    object_type,
                    object: object.clone(),
                };
                let classified = match self.seen.insert(uid, tracked) {
                    Some(previous) => change(
                        KubeEventCommand::Update,
                        Some(previous.object),
                        object.clone(),
                    ),
                    None => change(KubeEventCommand::Add, None, object.clone()),
                };
                vec![classified]
            }
            ObservedChange::Deleted(object) => {
                if let Some(uid) = uid(object) {
                    self.seen.remove(&uid);
                }
                vec![change(KubeEventCommand::Delete, None, object.clone())]
            }
            ObservedChange::RelistStarted => {
                self.relisting.insert(object_type, HashSet::new());
                Vec::new()
            }
            ObservedChange::RelistDone => {
                let Some(listed) = self.relisting.remove(object_type) else {
                    return Vec::new();
                };
                let stale: Vec<String> = self
                    .seen
                    .iter()
                    .filter(|(uid, tracked)| {
                        tracked.object_type == object_type && !listed.contains(*uid)
                    })
                    .map(|(uid, _)| uid.clone())
                    .collect();
                stale
                    .iter()
                    .filter_map(|uid| self.seen.remove(uid))
                    .map(|tracked| change(KubeEventCommand::Delete, None, tracked.object))
                    .collect()
            }
        }
    }

    /// Number of tracked objects.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

fn change(command: KubeEventCommand, old: Option<Value>, current: Value) -> ClassifiedChange {
    ClassifiedChange {
        command,
        old,
        current,
    }
}

fn uid(object: &Value) -> Option<String> {
    object
        .pointer("/metadata/uid")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Forwards watched changes to the kube event endpoint.
pub struct KubeEventPublisher {
    control_plane: Arc<dyn ControlPlane>,
    agent_name: String,
    tracker: ChangeTracker,
}

impl KubeEventPublisher {
    /// Create a publisher reporting as `agent_name`.
    pub fn new(control_plane: Arc<dyn ControlPlane>, agent_name: impl Into<String>) -> Self {
        Self {
            control_plane,
            agent_name: agent_name.into(),
            tracker: ChangeTracker::new(),
        }
    }

    /// Publish the events for one watched change. Failures are logged and
    /// dropped.
    pub async fn publish(&mut self, watched: WatchedObject) {
        let object_type = watched.object_type;
        for classified in self.tracker.classify(&watched) {
            let command = classified.command;
            let message = KubeEventMessage::new(
                command,
                object_type,
                &self.agent_name,
                classified.old,
                classified.current,
            );
            let body = match serde_json::to_value(&message) {
                Ok(body) => body,
                Err(e) => {
                    warn!(error = %e, "failed to encode kube event");
                    continue;
                }
            };
            debug!(object_type, ?command, "publishing kube event");
            if let Err(e) = self.control_plane.publish(Endpoint::KubeEvents, body).await {
                warn!(object_type, error = %e, "failed to publish kube event");
            }
        }
    }

    /// Publish changes until every watcher has hung up.
    pub async fn run(mut self, mut rx: mpsc::Receiver<WatchedObject>) {
        info!("kube event publisher started");
        while let Some(watched) = rx.recv().await {
            self.publish(watched).await;
        }
        info!(tracked = self.tracker.len(), "kube event publisher stopped");
    }
}
