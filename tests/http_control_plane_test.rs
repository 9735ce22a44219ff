//! Integration tests for the reqwest control plane client against a mock server.

use mockito::{Matcher, Server};
use serde_json::json;
use std::time::Duration;

use ci_agent::domain::errors::ControlPlaneError;
use ci_agent::domain::models::WorkloadKind;
use ci_agent::domain::ports::{ControlPlane, Endpoint};
use ci_agent::infrastructure::http::HttpControlPlane;

fn client(server: &Server) -> HttpControlPlane {
    HttpControlPlane::with_base_url(&server.url(), "tok-123", "agent-1", Duration::from_secs(5))
        .expect("Failed to create client")
}

#[tokio::test]
async fn test_fetch_jobs_sends_count_agent_and_token() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/process_life_cycle_events")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("count".into(), "3".into()),
            Matcher::UrlEncoded("agent".into(), "agent-1".into()),
        ]))
        .match_header("token", "tok-123")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "data": [{
                    "step": "deployDev",
                    "process_id": "p-1",
                    "type": "deployment",
                    "name": "svc",
                    "images": ["img:v2"],
                    "claim": 2
                }]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let jobs = client(&server).fetch_jobs(3).await.unwrap();

    mock.assert_async().await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].kind, Some(WorkloadKind::Deployment));
    assert_eq!(jobs[0].claim, 2);
}

#[tokio::test]
async fn test_fetch_jobs_accepts_null_data() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/process_life_cycle_events")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"data": null}"#)
        .create_async()
        .await;

    let jobs = client(&server).fetch_jobs(1).await.unwrap();
    assert!(jobs.is_empty());
}

#[tokio::test]
async fn test_fetch_jobs_reports_undecodable_body() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/process_life_cycle_events")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("not json")
        .create_async()
        .await;

    let err = client(&server).fetch_jobs(1).await.unwrap_err();
    assert!(matches!(err, ControlPlaneError::Decode(_)));
}

#[tokio::test]
async fn test_non_success_status_is_an_error() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/logs")
        .with_status(503)
        .with_body("maintenance")
        .create_async()
        .await;

    let err = client(&server)
        .publish(Endpoint::Logs, json!({"log": "x"}))
        .await
        .unwrap_err();
    match err {
        ControlPlaneError::Status { status, body } => {
            assert_eq!(status, 503);
            assert_eq!(body, "maintenance");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_publish_posts_json_with_token() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/process_life_cycle_events")
        .match_header("token", "tok-123")
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(json!({"events": []})))
        .with_status(200)
        .create_async()
        .await;

    client(&server)
        .publish(Endpoint::ProcessLifeCycleEvents, json!({"events": []}))
        .await
        .unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_unreachable_control_plane_is_transport_error() {
    let client = HttpControlPlane::with_base_url(
        "http://127.0.0.1:1",
        "tok-123",
        "agent-1",
        Duration::from_secs(2),
    )
    .unwrap();

    let err = client.fetch_jobs(1).await.unwrap_err();
    assert!(matches!(err, ControlPlaneError::Transport(_)));
}
