//! Integration tests for the staging agent's HTTP routes
//!
//! Requests go straight into the router with `oneshot`; no socket is bound.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use paramstage::config::StageConfig;
use paramstage::remote::LocalRemote;
use paramstage::server::{build_app, AppState};
use paramstage::strategy::StrategyFactory;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

struct TestServer {
    app: Router,
    remote: Arc<LocalRemote>,
    _home: TempDir,
}

fn setup() -> TestServer {
    let home = TempDir::new().unwrap();
    let config = StageConfig::load_from(home.path()).unwrap();
    let remote = Arc::new(LocalRemote::new());
    let state = AppState::new(&config, StrategyFactory::from_remote(remote.clone()));
    TestServer {
        app: build_app(state),
        remote,
        _home: home,
    }
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    post_with_headers(app, uri, body, &[]).await
}

async fn post_with_headers(
    app: &Router,
    uri: &str,
    body: Value,
    headers: &[(&str, &str)],
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder.body(Body::from(body.to_string())).unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_health() {
    let server = setup();
    let response = server
        .app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"OK");
}

#[tokio::test]
async fn test_add_status_apply() {
    let server = setup();

    let (status, body) = post(
        &server.app,
        "/v1/add",
        json!({"service": "param", "name": "/app/config", "value": "v1"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "/app/config");

    let (status, body) = post(
        &server.app,
        "/v1/status",
        json!({"service": "parameter", "show_values": true}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "parameter");
    assert_eq!(body["entries"][0]["operation"], "create");
    assert_eq!(body["entries"][0]["value"], "v1");

    let (status, body) = post(&server.app, "/v1/apply", json!({"service": "param"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entry_succeeded"], 1);
    assert_eq!(body["entries"][0]["status"], "created");

    let (_, body) = post(&server.app, "/v1/status", json!({"service": "param"})).await;
    assert_eq!(body["entries"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_error_bodies_are_classified() {
    let server = setup();

    let (status, body) = post(&server.app, "/v1/status", json!({"service": "bucket"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_service");

    let (status, body) = post(
        &server.app,
        "/v1/edit",
        json!({"service": "secret", "name": "missing", "value": "x"}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");

    server.remote.seed_secret("exists", "v");
    let (status, body) = post(
        &server.app,
        "/v1/add",
        json!({"service": "secret", "name": "exists", "value": "x"}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "already_exists");
}

#[tokio::test]
async fn test_tag_and_cancel_tag() {
    let server = setup();
    server.remote.seed_parameter("/app/config", "v");

    let (status, body) = post(
        &server.app,
        "/v1/tag",
        json!({"service": "param", "name": "/app/config", "tags": {"env": "prod"}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["add"]["env"], "prod");

    let (status, body) = post(
        &server.app,
        "/v1/cancel-tag",
        json!({"service": "param", "kind": "add", "name": "/app/config", "keys": ["env"]}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["unstaged"], true);

    let (status, body) = post(
        &server.app,
        "/v1/cancel-tag",
        json!({"service": "param", "kind": "add", "name": "/app/config", "keys": ["env"]}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_staged");
}

#[tokio::test]
async fn test_reset_all() {
    let server = setup();
    post(
        &server.app,
        "/v1/add",
        json!({"service": "secret", "name": "token", "value": "t"}),
    )
    .await;

    let (status, body) = post(
        &server.app,
        "/v1/reset",
        json!({"service": "secret", "all": true}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "unstaged_all");
    assert_eq!(body["entries"], 1);
}

#[tokio::test]
async fn test_scopes_are_isolated() {
    let server = setup();
    let other = [("x-paramstage-account", "111111111111")];

    post_with_headers(
        &server.app,
        "/v1/add",
        json!({"service": "param", "name": "/app/scoped", "value": "v"}),
        &other,
    )
    .await;

    let (_, body) = post(&server.app, "/v1/status", json!({"service": "param"})).await;
    assert_eq!(body["entries"].as_array().unwrap().len(), 0);

    let (_, body) =
        post_with_headers(&server.app, "/v1/status", json!({"service": "param"}), &other).await;
    assert_eq!(body["entries"].as_array().unwrap().len(), 1);

    let response = server
        .app
        .clone()
        .oneshot(Request::get("/v1/scopes").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let scopes: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(scopes["scopes"]
        .as_array()
        .unwrap()
        .iter()
        .any(|s| s.as_str().unwrap().starts_with("111111111111")));
}

#[tokio::test]
async fn test_persist_and_drain_through_file() {
    let server = setup();
    post(
        &server.app,
        "/v1/add",
        json!({"service": "param", "name": "/app/handoff", "value": "v"}),
    )
    .await;

    let (status, body) = post(&server.app, "/v1/persist", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entries"], 1);

    let (_, body) = post(&server.app, "/v1/status", json!({"service": "param"})).await;
    assert_eq!(body["entries"].as_array().unwrap().len(), 0);

    let (status, body) = post(&server.app, "/v1/drain", json!({"keep": false})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entries"], 1);
    assert_eq!(body["merged"], false);

    let (_, body) = post(&server.app, "/v1/status", json!({"service": "param"})).await;
    assert_eq!(body["entries"][0]["name"], "/app/handoff");
}

#[tokio::test]
async fn test_unsafe_scope_header_is_rejected() {
    let server = setup();

    for account in ["1/2", "..", "a b"] {
        let headers = [("x-paramstage-account", account)];
        let (status, body) = post_with_headers(
            &server.app,
            "/v1/add",
            json!({"service": "param", "name": "/app/x", "value": "v"}),
            &headers,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{account}");
        assert_eq!(body["code"], "invalid_scope");

        let (status, body) =
            post_with_headers(&server.app, "/v1/persist", json!({}), &headers).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid_scope");
    }

    // nothing was staged under any scope
    let response = server
        .app
        .clone()
        .oneshot(Request::get("/v1/scopes").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let scopes: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(scopes["scopes"].as_array().unwrap().is_empty());
}
