mod common;

use axum::body::Body;
use axum::http::{self, Method, StatusCode};
use common::{test_config, test_router};
use serde_json::json;
use tower::ServiceExt;
use wiremock::matchers::any;
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn silent_upstream() -> MockServer {
    let upstream = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&upstream)
        .await;
    upstream
}

async fn preflight(router: axum::Router, uri: &str) -> http::Response<Body> {
    router
        .oneshot(
            http::Request::builder()
                .method(Method::OPTIONS)
                .uri(uri)
                .header("origin", "https://app.example")
                .header("access-control-request-method", "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn preflight_is_answered_without_reaching_upstream() {
    let upstream = silent_upstream().await;
    let config = test_config(&upstream);

    let cases = [
        ("/api/fal", "POST,OPTIONS"),
        ("/api/fal/status", "GET,OPTIONS"),
        ("/api/fal/status/42", "GET,OPTIONS"),
        ("/api/fashn/v1/run", "GET,POST,OPTIONS"),
        ("/api/openai", "POST,OPTIONS"),
        ("/health", "GET,OPTIONS"),
    ];

    for (uri, methods) in cases {
        let response = preflight(test_router(&config), uri).await;

        assert_eq!(response.status(), StatusCode::OK, "{uri}");
        let headers = response.headers();
        assert_eq!(headers["access-control-allow-origin"], "*");
        assert_eq!(headers["access-control-allow-methods"], methods);
        assert_eq!(headers["access-control-allow-headers"], "content-type");
    }
}

#[tokio::test]
async fn configured_origin_is_used() {
    let upstream = silent_upstream().await;
    let mut config = test_config(&upstream);
    config.cors.allow_origin = "https://app.example".to_string();
    config.cors.allow_headers = "Content-Type, Authorization".to_string();

    let response = preflight(test_router(&config), "/api/fal").await;

    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "https://app.example"
    );
    assert_eq!(
        response.headers()["access-control-allow-headers"],
        "content-type,authorization"
    );
}

#[tokio::test]
async fn undeclared_method_gets_405_envelope() {
    let upstream = silent_upstream().await;
    let config = test_config(&upstream);

    let response = test_router(&config)
        .oneshot(
            http::Request::builder()
                .method(Method::GET)
                .uri("/api/fal")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
}

#[tokio::test]
async fn error_responses_carry_allow_origin() {
    let upstream = silent_upstream().await;
    let config = test_config(&upstream);

    let response = test_router(&config)
        .oneshot(
            http::Request::builder()
                .method(Method::GET)
                .uri("/api/fal/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
}
