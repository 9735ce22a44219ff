//! Change notifications for agent-managed cluster objects.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// What happened to the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum KubeEventCommand {
    /// First sighting.
    Add,
    /// Changed since last seen.
    Update,
    /// Removed.
    Delete,
}

/// Routing data of a kube event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KubeEventHeader {
    /// Always 0.
    pub offset: i64,
    /// What happened.
    pub command: KubeEventCommand,
    /// `type`, `agent` and `object` tags.
    pub extras: BTreeMap<String, String>,
}

/// Message posted to the kube event endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KubeEventMessage {
    /// The object, or `{old_k8s_obj, new_k8s_obj}` for updates.
    pub body: Value,
    /// Routing data.
    pub header: KubeEventHeader,
}

impl KubeEventMessage {
    /// Builds a message for an object of `object_type` observed by `agent`.
    ///
    /// Updates carry both revisions as `{old_k8s_obj, new_k8s_obj}`.
    pub fn new(
        command: KubeEventCommand,
        object_type: &str,
        agent: &str,
        old: Option<Value>,
        current: Value,
    ) -> Self {
        let body = match (command, old) {
            (KubeEventCommand::Update, old) => serde_json::json!({
                "old_k8s_obj": old.unwrap_or(Value::Null),
                "new_k8s_obj": current,
            }),
            (_, _) => current,
        };
        let extras = BTreeMap::from([
            ("type".to_string(), object_type.to_string()),
            ("agent".to_string(), agent.to_string()),
            ("object".to_string(), object_type.to_string()),
        ]);
        Self {
            body,
            header: KubeEventHeader {
                offset: 0,
                command,
                extras,
            },
        }
    }
}
