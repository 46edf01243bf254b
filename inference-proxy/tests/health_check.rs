mod common;

use common::TestApp;
use wiremock::MockServer;

#[tokio::test]
async fn health_check_returns_ok() {
    let upstream = MockServer::start().await;
    let app = TestApp::spawn(&upstream).await;

    let response = app
        .client
        .get(app.url("/health"))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "*"
    );

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "inference-proxy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn request_id_is_echoed() {
    let upstream = MockServer::start().await;
    let app = TestApp::spawn(&upstream).await;

    let response = app
        .client
        .get(app.url("/health"))
        .header("x-request-id", "req-123")
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.headers()["x-request-id"], "req-123");

    let minted = app
        .client
        .get(app.url("/health"))
        .send()
        .await
        .expect("Failed to send request");
    assert!(minted.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn metrics_endpoint_serves_text() {
    let upstream = MockServer::start().await;
    let app = TestApp::spawn(&upstream).await;

    let response = app
        .client
        .get(app.url("/metrics"))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
}

#[tokio::test]
async fn unknown_route_returns_not_found_envelope() {
    let upstream = MockServer::start().await;
    let app = TestApp::spawn(&upstream).await;

    let response = app
        .client
        .get(app.url("/api/unknown"))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 404);
    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert!(body["error"].as_str().unwrap().contains("/api/unknown"));
}
