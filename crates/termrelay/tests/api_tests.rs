//! HTTP API integration tests.

use axum::{
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;

mod common;
use common::{shell_config, test_app};

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn run_code_request(payload: Value) -> Request<Body> {
    Request::builder()
        .uri("/run-code")
        .method(Method::POST)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_string(&payload).unwrap()))
        .unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let root = tempfile::tempdir().unwrap();
    let app = test_app(shell_config(root.path()));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .method(Method::GET)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_run_code_success() {
    let root = tempfile::tempdir().unwrap();
    let app = test_app(shell_config(root.path()));

    let response = app
        .oneshot(run_code_request(json!({
            "code": "read name\necho \"hello $name\"",
            "stdin": "world\n"
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["output"], "hello world\n");
    assert_eq!(json["error"], "");
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_run_code_stdin_defaults_to_empty() {
    let root = tempfile::tempdir().unwrap();
    let app = test_app(shell_config(root.path()));

    let response = app
        .oneshot(run_code_request(json!({ "code": "echo ok" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["output"], "ok\n");
}

#[tokio::test]
async fn test_run_code_failure_reports_stderr() {
    let root = tempfile::tempdir().unwrap();
    let app = test_app(shell_config(root.path()));

    let response = app
        .oneshot(run_code_request(json!({
            "code": "echo out\necho 'something broke' >&2\nexit 3",
            "stdin": ""
        })))
        .await
        .unwrap();

    // Program failures are reported in the body, not the status.
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["output"], "");
    assert_eq!(json["error"], "something broke\n");
}

#[tokio::test]
async fn test_run_code_missing_interpreter() {
    let root = tempfile::tempdir().unwrap();
    let mut config = shell_config(root.path());
    config.interpreter.program = "/no/such/interpreter".to_string();
    let app = test_app(config);

    let response = app
        .oneshot(run_code_request(json!({ "code": "echo hi", "stdin": "" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["output"], "");
    assert!(json["error"].as_str().unwrap().contains("/no/such/interpreter"));
}

#[tokio::test]
async fn test_run_code_malformed_body() {
    let root = tempfile::tempdir().unwrap();
    let app = test_app(shell_config(root.path()));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/run-code")
                .method(Method::POST)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_client_error());
    let json = body_json(response).await;
    assert_eq!(json["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_run_code_missing_code_field() {
    let root = tempfile::tempdir().unwrap();
    let app = test_app(shell_config(root.path()));

    let response = app
        .oneshot(run_code_request(json!({ "stdin": "x" })))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_unknown_route_is_structured_404() {
    let root = tempfile::tempdir().unwrap();
    let app = test_app(shell_config(root.path()));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_cors_allows_configured_origin() {
    let root = tempfile::tempdir().unwrap();
    let app = test_app(shell_config(root.path()));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/run-code")
                .method(Method::OPTIONS)
                .header(header::ORIGIN, "http://localhost:5173")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "http://localhost:5173"
    );
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
        "true"
    );
}

#[tokio::test]
async fn test_cors_rejects_unknown_origin() {
    let root = tempfile::tempdir().unwrap();
    let app = test_app(shell_config(root.path()));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .header(header::ORIGIN, "https://evil.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none()
    );
}
