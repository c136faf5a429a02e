//! Admission control through the full middleware stack.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use greenlight::http::response::{NOT_FOUND, SHUTTING_DOWN};

mod common;

use common::{build_app, router_for, test_config, RecordingMailer};

async fn get(router: &Router, uri: &str) -> Response {
    router
        .clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn healthcheck_reports_environment_and_version() {
    let test = build_app(test_config(), Arc::new(RecordingMailer::new()));
    let router = router_for(&test.app, [10, 0, 0, 1]);

    let response = get(&router, "/v1/healthcheck").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({
            "status": "available",
            "system_info": { "environment": "development", "version": greenlight::VERSION }
        })
    );
}

#[tokio::test]
async fn exhausted_client_gets_429_envelope() {
    let test = build_app(test_config(), Arc::new(RecordingMailer::new()));
    let router = router_for(&test.app, [10, 0, 0, 1]);

    for _ in 0..4 {
        assert_eq!(get(&router, "/v1/healthcheck").await.status(), StatusCode::OK);
    }

    let response = get(&router, "/v1/healthcheck").await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body_json(response).await, json!({ "error": "rate limit exceeded" }));
}

#[tokio::test]
async fn clients_are_limited_independently() {
    let test = build_app(test_config(), Arc::new(RecordingMailer::new()));
    let noisy = router_for(&test.app, [10, 0, 0, 1]);
    let quiet = router_for(&test.app, [10, 0, 0, 2]);

    while get(&noisy, "/v1/healthcheck").await.status() == StatusCode::OK {}

    assert_eq!(get(&quiet, "/v1/healthcheck").await.status(), StatusCode::OK);
    assert_eq!(test.app.limiter().tracked_clients(), 2);
}

#[tokio::test]
async fn disabled_limiter_admits_everything() {
    let mut config = test_config();
    config.limiter.enabled = false;
    let test = build_app(config, Arc::new(RecordingMailer::new()));
    let router = router_for(&test.app, [10, 0, 0, 1]);

    for _ in 0..50 {
        assert_eq!(get(&router, "/v1/healthcheck").await.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn draining_server_rejects_before_spending_tokens() {
    let test = build_app(test_config(), Arc::new(RecordingMailer::new()));
    let router = router_for(&test.app, [10, 0, 0, 1]);

    test.shutdown.begin_draining();

    let response = get(&router, "/v1/healthcheck").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.headers()[header::CONNECTION], "close");
    assert_eq!(body_json(response).await, json!({ "error": SHUTTING_DOWN }));
    assert_eq!(test.app.limiter().tracked_clients(), 0);
}

#[tokio::test]
async fn unknown_route_returns_json_404() {
    let test = build_app(test_config(), Arc::new(RecordingMailer::new()));
    let router = router_for(&test.app, [10, 0, 0, 1]);

    let response = get(&router, "/v1/movies/unknown").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await, json!({ "error": NOT_FOUND }));
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let test = build_app(test_config(), Arc::new(RecordingMailer::new()));
    let router = router_for(&test.app, [10, 0, 0, 1]);

    let response = get(&router, "/v1/healthcheck").await;
    assert!(response.headers().contains_key("x-request-id"));

    let response = router
        .clone()
        .oneshot(
            Request::get("/v1/healthcheck")
                .header("x-request-id", "abc-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "abc-123");
}

#[tokio::test]
async fn cors_preflight_only_for_trusted_origins() {
    let test = build_app(test_config(), Arc::new(RecordingMailer::new()));
    let router = router_for(&test.app, [10, 0, 0, 1]);

    let preflight = |origin: &'static str| {
        Request::builder()
            .method("OPTIONS")
            .uri("/v1/healthcheck")
            .header(header::ORIGIN, origin)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "PUT")
            .body(Body::empty())
            .unwrap()
    };

    let response = router.clone().oneshot(preflight("https://trusted.example")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://trusted.example"
    );

    let response = router.clone().oneshot(preflight("https://evil.example")).await.unwrap();
    assert!(!response.headers().contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));

    // Preflight is answered before admission, so no tokens were spent.
    assert_eq!(test.app.limiter().tracked_clients(), 0);
}

#[tokio::test]
async fn debug_vars_reports_runtime_state() {
    let test = build_app(test_config(), Arc::new(RecordingMailer::new()));
    let router = router_for(&test.app, [10, 0, 0, 1]);

    let response = get(&router, "/debug/vars").await;
    assert_eq!(response.status(), StatusCode::OK);

    let vars = body_json(response).await;
    assert_eq!(vars["version"], greenlight::VERSION);
    assert_eq!(vars["shutdown_state"], "running");
    assert_eq!(vars["requests_in_flight"], 1);
    assert_eq!(vars["tasks"]["background_outstanding"], 0);
    assert_eq!(vars["database"]["max_open"], 25);
    assert_eq!(vars["database"]["size"], 0);
    assert_eq!(vars["rate_limiter"]["tracked_clients"], 1);
    assert!(vars["timestamp"].as_i64().unwrap() > 0);
}
