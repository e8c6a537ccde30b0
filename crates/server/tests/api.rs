//! Router-level integration tests exercising the §6 HTTP surface end to end
//! over the real `axum::Router`, without a listening socket.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use conduit_server::{build_router, ServerConfig};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

fn test_config() -> ServerConfig {
    ServerConfig::default()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_check_reports_ok() {
    let (app, _state) = build_router(&test_config());
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn create_task_rejects_empty_prompt() {
    let (app, _state) = build_router(&test_config());
    let request = Request::builder()
        .method("POST")
        .uri("/tasks")
        .header("content-type", "application/json")
        .body(Body::from(json!({"prompt": "", "requesterId": "u1"}).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn get_unknown_task_is_404() {
    let (app, _state) = build_router(&test_config());
    let response = app
        .oneshot(Request::builder().uri("/tasks/does-not-exist").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_task_returns_running_status() {
    let (app, _state) = build_router(&test_config());
    let request = Request::builder()
        .method("POST")
        .uri("/tasks")
        .header("content-type", "application/json")
        .body(Body::from(json!({"prompt": "hi", "requesterId": "u1"}).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "running");
    assert!(body["taskId"].as_str().unwrap().starts_with("task_"));
}

#[tokio::test]
async fn resolve_unknown_approval_is_404() {
    let (app, _state) = build_router(&test_config());
    let request = Request::builder()
        .method("POST")
        .uri("/approvals/does-not-exist")
        .header("content-type", "application/json")
        .body(Body::from(json!({"decision": "approved"}).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
