//! Exercises the read-only HTTP surface through the real axum router,
//! without binding a socket.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use swarm_common::CoreConfig;
use swarm_server::{build_router, AppState};
use tower::ServiceExt;

fn state(data_dir: &std::path::Path) -> AppState {
    AppState::new(CoreConfig {
        data_dir: data_dir.to_string_lossy().to_string(),
        ..CoreConfig::default()
    })
}

async fn get(router: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = router
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn health_reports_ok() {
    let dir = tempfile::tempdir().unwrap();
    let router = build_router(state(dir.path()));
    let (status, body) = get(router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn project_status_spawns_the_project_on_first_request() {
    let dir = tempfile::tempdir().unwrap();
    let router = build_router(state(dir.path()));
    let (status, _) = get(router.clone(), "/api/projects/demo/status").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get(router, "/api/projects").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!(["demo"]));
}

#[tokio::test]
async fn agents_and_tasks_start_empty_for_a_fresh_project() {
    let dir = tempfile::tempdir().unwrap();
    let router = build_router(state(dir.path()));
    let (status, body) = get(router.clone(), "/api/projects/demo/agents").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!([]));

    let (status, body) = get(router, "/api/projects/demo/tasks").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!([]));
}

#[tokio::test]
async fn logs_accepts_since_seq_and_max_query_params() {
    let dir = tempfile::tempdir().unwrap();
    let router = build_router(state(dir.path()));
    let (status, body) = get(router, "/api/projects/demo/logs?since_seq=0&max=10").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().is_some());
}
