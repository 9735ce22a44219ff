//! Integration tests for the reporting observers.

mod common;

use serde_json::json;
use std::sync::Arc;

use ci_agent::domain::models::{AgentConfig, EventKind, Footmark, ProgressEvent};
use ci_agent::domain::ports::{ControlPlane, Endpoint, Observer};
use ci_agent::infrastructure::cluster::{ObservedChange, WatchedObject};
use ci_agent::services::{
    register_agent, KubeEventPublisher, LifeCycleObserver, LogObserver, ProcessObserver,
};
use common::{deployment_job, RecordingControlPlane};

fn control_plane() -> (Arc<RecordingControlPlane>, Arc<dyn ControlPlane>) {
    let recording = Arc::new(RecordingControlPlane::new());
    let port = recording.clone() as Arc<dyn ControlPlane>;
    (recording, port)
}

fn event(kind: EventKind, log: &str) -> ProgressEvent {
    ProgressEvent::for_job(&deployment_job("svc", &["img:v2"]), kind, log)
}

#[tokio::test]
async fn test_log_observer_posts_every_event() {
    let (recording, port) = control_plane();
    let observer = LogObserver::new(port);

    observer
        .listen(&event(
            EventKind::Warning {
                footmark: Footmark::UpdateResource,
            },
            "[WARNING] index out of bound! ignoring container for sidecar:v9",
        ))
        .await;

    let posts = recording.published_to(Endpoint::Logs);
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["process_id"], "p-1");
    assert_eq!(posts[0]["step"], "deployDev");
    assert_eq!(posts[0]["footmark"], "update_resource");
    assert_eq!(posts[0]["claim"], 1);
    assert!(posts[0]["created_at"].is_string());
}

#[tokio::test]
async fn test_process_observer_sends_event_data() {
    let (recording, port) = control_plane();
    let observer = ProcessObserver::new(port);

    observer
        .listen(&event(
            EventKind::Failed {
                reason: "Pod has error: ImagePullBackOff".to_string(),
            },
            "Update Failed: Pod has error: ImagePullBackOff",
        ))
        .await;

    let posts = recording.published_to(Endpoint::ProcessEvents);
    assert_eq!(posts.len(), 1);
    let body = &posts[0];
    assert_eq!(body["company_id"], "acme");
    assert_eq!(body["data"]["status"], "FAILED");
    assert_eq!(body["data"]["footmark"], "post_agent_job");
    assert_eq!(body["data"]["reason"], "Pod has error: ImagePullBackOff");
    assert_eq!(body["data"]["claim"], "1");
    assert_eq!(body["data"]["type"], "Deployment");
}

#[tokio::test]
async fn test_life_cycle_observer_ignores_non_terminal_events() {
    let (recording, port) = control_plane();
    let observer = LifeCycleObserver::new(port, "agent-1");

    observer
        .listen(&event(
            EventKind::Processing {
                footmark: Footmark::UpdateResource,
            },
            "Updating resource",
        ))
        .await;
    observer
        .listen(&event(
            EventKind::Warning {
                footmark: Footmark::UpdateResource,
            },
            "[WARNING]Failed to list Existing Pods!",
        ))
        .await;

    assert!(recording.published().is_empty());
}

#[tokio::test]
async fn test_life_cycle_observer_marks_failed_step() {
    let (recording, port) = control_plane();
    let observer = LifeCycleObserver::new(port, "agent-1");

    observer
        .listen(&event(
            EventKind::Failed {
                reason: "boom".to_string(),
            },
            "Update Failed: boom",
        ))
        .await;

    let posts = recording.published_to(Endpoint::ProcessLifeCycleEvents);
    assert_eq!(posts.len(), 1);
    let events = posts[0]["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["status"], "failed");
    assert_eq!(events[0]["step"], "deployDev");
}

#[tokio::test]
async fn test_publish_failure_is_swallowed() {
    let (recording, port) = control_plane();
    recording.fail_publishes();
    let observer = LogObserver::new(port);

    observer
        .listen(&event(EventKind::Successful, "Agent Job Completed"))
        .await;

    assert_eq!(recording.published().len(), 1);
}

#[tokio::test]
async fn test_registration_posts_agent_identity() {
    let (recording, port) = control_plane();
    let agent = AgentConfig {
        name: "agent-1".to_string(),
        token: "secret".to_string(),
        terminal_base_url: "https://terminal.example".to_string(),
        terminal_api_version: "v1".to_string(),
    };

    register_agent(port.as_ref(), &agent).await.unwrap();

    let posts = recording.published_to(Endpoint::Agents);
    assert_eq!(
        posts,
        vec![json!({
            "name": "agent-1",
            "api_version": "v1",
            "terminal_base_url": "https://terminal.example"
        })]
    );
}

#[tokio::test]
async fn test_kube_event_publisher_classifies_changes() {
    let (recording, port) = control_plane();
    let mut publisher = KubeEventPublisher::new(port, "agent-1");
    let object = |revision: &str| {
        json!({"metadata": {"name": "svc", "uid": "u-1", "resourceVersion": revision}})
    };

    publisher
        .publish(WatchedObject {
            object_type: "deployment",
            change: ObservedChange::Applied(object("1")),
        })
        .await;
    publisher
        .publish(WatchedObject {
            object_type: "deployment",
            change: ObservedChange::Applied(object("2")),
        })
        .await;
    publisher
        .publish(WatchedObject {
            object_type: "deployment",
            change: ObservedChange::Deleted(object("2")),
        })
        .await;

    let posts = recording.published_to(Endpoint::KubeEvents);
    let commands: Vec<_> = posts
        .iter()
        .map(|post| post["header"]["command"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(commands, ["ADD", "UPDATE", "DELETE"]);

    assert_eq!(posts[1]["body"]["old_k8s_obj"], object("1"));
    assert_eq!(posts[1]["body"]["new_k8s_obj"], object("2"));
    assert_eq!(posts[0]["header"]["offset"], 0);
    assert_eq!(posts[0]["header"]["extras"]["type"], "deployment");
    assert_eq!(posts[0]["header"]["extras"]["agent"], "agent-1");
}

#[tokio::test]
async fn test_kube_event_publisher_reports_objects_lost_across_watch_restart() {
    let (recording, port) = control_plane();
    let mut publisher = KubeEventPublisher::new(port, "agent-1");
    let secret = |uid: &str| json!({"metadata": {"name": uid, "uid": uid, "resourceVersion": "1"}});
    let watched = |change| WatchedObject {
        object_type: "secret",
        change,
    };

    publisher.publish(watched(ObservedChange::Applied(secret("kept")))).await;
    publisher.publish(watched(ObservedChange::Applied(secret("gone")))).await;
    publisher.publish(watched(ObservedChange::RelistStarted)).await;
    publisher.publish(watched(ObservedChange::Applied(secret("kept")))).await;
    publisher.publish(watched(ObservedChange::RelistDone)).await;

    let posts = recording.published_to(Endpoint::KubeEvents);
    let commands: Vec<_> = posts
        .iter()
        .map(|post| post["header"]["command"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(commands, ["ADD", "ADD", "UPDATE", "DELETE"]);
    assert_eq!(posts[3]["body"], secret("gone"));
}
