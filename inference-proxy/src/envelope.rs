//! Client-facing response envelope.
//!
//! Every API route group gets a [`CorsLayer`] built from [`CorsPolicy`] and,
//! inside it, [`envelope_middleware`] with the group's [`MethodGate`].
//! Preflight requests are answered by the CORS layer before any handler
//! runs; undeclared methods get a 405 envelope. Handlers return either an
//! [`UpstreamReply`] or an [`AppError`]; neither builds headers itself.

use crate::config::CorsConfig;
use crate::services::upstream::{UpstreamBody, UpstreamReply};
use axum::{
    extract::{Request, State},
    http::{HeaderName, HeaderValue, Method, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use service_core::error::AppError;
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};

/// Cross-origin policy shared by all routes; methods are set per route.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    allow_origin: AllowOrigin,
    allow_headers: AllowHeaders,
}

impl CorsPolicy {
    /// Validate `CORS_ALLOW_ORIGIN` / `CORS_ALLOW_HEADERS`.
    ///
    /// Both accept `*` or a comma separated list.
    pub fn from_config(config: &CorsConfig) -> Result<Self, AppError> {
        let invalid = |name: &str, value: &str, e: &dyn std::fmt::Display| {
            AppError::ConfigError(anyhow::anyhow!(
                "{} has an invalid entry '{}': {}",
                name,
                value,
                e
            ))
        };

        let origins = comma_list(&config.allow_origin);
        let allow_origin = if origins.is_empty() || origins.contains(&"*") {
            AllowOrigin::any()
        } else {
            let values = origins
                .iter()
                .map(|o| {
                    HeaderValue::from_str(o).map_err(|e| invalid("CORS_ALLOW_ORIGIN", o, &e))
                })
                .collect::<Result<Vec<_>, _>>()?;
            match values.as_slice() {
                [single] => AllowOrigin::exact(single.clone()),
                _ => AllowOrigin::list(values),
            }
        };

        let headers = comma_list(&config.allow_headers);
        let allow_headers = if headers.contains(&"*") {
            AllowHeaders::any()
        } else {
            let names = headers
                .iter()
                .map(|h| {
                    HeaderName::from_bytes(h.as_bytes())
                        .map_err(|e| invalid("CORS_ALLOW_HEADERS", h, &e))
                })
                .collect::<Result<Vec<_>, _>>()?;
            AllowHeaders::list(names)
        };

        Ok(Self {
            allow_origin,
            allow_headers,
        })
    }

    /// CORS layer for a route accepting `methods` (plus `OPTIONS`).
    pub fn layer_for(&self, methods: &[Method]) -> CorsLayer {
        CorsLayer::new()
            .allow_origin(self.allow_origin.clone())
            .allow_headers(self.allow_headers.clone())
            .allow_methods(with_options(methods))
    }
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self {
            allow_origin: AllowOrigin::any(),
            allow_headers: AllowHeaders::list([axum::http::header::CONTENT_TYPE]),
        }
    }
}

fn comma_list(raw: &str) -> Vec<&str> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn with_options(methods: &[Method]) -> Vec<Method> {
    let mut allowed = methods.to_vec();
    if !allowed.contains(&Method::OPTIONS) {
        allowed.push(Method::OPTIONS);
    }
    allowed
}

/// Methods declared for one route group.
#[derive(Debug, Clone)]
pub struct MethodGate {
    methods: Vec<Method>,
}

impl MethodGate {
    pub fn new(methods: &[Method]) -> Arc<Self> {
        Arc::new(Self {
            methods: with_options(methods),
        })
    }

    pub fn allows(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }
}

/// Runs inside the CORS layer, so preflights never get here and every
/// response it returns still receives `Access-Control-Allow-Origin`.
pub async fn envelope_middleware(
    State(gate): State<Arc<MethodGate>>,
    req: Request,
    next: Next,
) -> Response {
    if !gate.allows(req.method()) {
        let method = req.method().to_string();
        tracing::debug!(method = %method, uri = %req.uri(), "Rejected undeclared method");
        return AppError::MethodNotAllowed(method).into_response();
    }

    next.run(req).await
}

/// Envelope for paths no route declares.
pub async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(anyhow::anyhow!("No route for {}", uri.path()))
}

impl IntoResponse for UpstreamReply {
    fn into_response(self) -> Response {
        match self.body {
            UpstreamBody::Parsed(value) => (self.status, Json(value)).into_response(),
            UpstreamBody::Unparseable {
                excerpt,
                upstream_status,
            } => AppError::UpstreamContract {
                upstream_status: upstream_status.as_u16(),
                excerpt,
            }
            .into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{self, header, StatusCode},
        middleware::from_fn_with_state,
        routing::any,
        Router,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    fn app(policy: &CorsPolicy, methods: &[Method], hits: Arc<AtomicUsize>) -> Router {
        Router::new()
            .route(
                "/x",
                any(move || {
                    let hits = hits.clone();
                    async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        "ok"
                    }
                }),
            )
            .route_layer(from_fn_with_state(
                MethodGate::new(methods),
                envelope_middleware,
            ))
            .route_layer(policy.layer_for(methods))
    }

    fn request(method: Method) -> http::Request<Body> {
        http::Request::builder()
            .method(method)
            .uri("/x")
            .header(header::ORIGIN, "https://app.example")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn preflight_lists_declared_methods_without_reaching_handler() {
        let hits = Arc::new(AtomicUsize::new(0));
        let response = app(
            &CorsPolicy::default(),
            &[Method::GET, Method::POST],
            hits.clone(),
        )
        .oneshot(request(Method::OPTIONS))
        .await
        .unwrap();

        assert!(response.status().is_success());
        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "GET,POST,OPTIONS");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "content-type");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn undeclared_method_gets_405_with_allow_origin() {
        let hits = Arc::new(AtomicUsize::new(0));
        let response = app(&CorsPolicy::default(), &[Method::POST], hits.clone())
            .oneshot(request(Method::GET))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn configured_origins_are_echoed_when_listed() {
        let policy = CorsPolicy::from_config(&CorsConfig {
            allow_origin: "https://app.example, https://admin.example".into(),
            allow_headers: "Content-Type, Authorization".into(),
        })
        .unwrap();
        let hits = Arc::new(AtomicUsize::new(0));

        let response = app(&policy, &[Method::POST], hits.clone())
            .oneshot(request(Method::POST))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://app.example"
        );
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn gate_always_admits_options() {
        let gate = MethodGate::new(&[Method::POST]);
        assert!(gate.allows(&Method::POST));
        assert!(gate.allows(&Method::OPTIONS));
        assert!(!gate.allows(&Method::GET));
    }

    #[test]
    fn relayed_replies_keep_upstream_status() {
        let reply = UpstreamReply {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            body: UpstreamBody::Parsed(serde_json::json!({ "detail": "bad" })),
        };
        assert_eq!(reply.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn unparseable_replies_become_bad_gateway() {
        let reply = UpstreamReply {
            status: StatusCode::OK,
            body: UpstreamBody::Unparseable {
                excerpt: "<html>".into(),
                upstream_status: StatusCode::OK,
            },
        };
        assert_eq!(reply.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn invalid_header_name_is_a_configuration_error() {
        let config = CorsConfig {
            allow_origin: "*".into(),
            allow_headers: "Content Type".into(),
        };
        assert!(matches!(
            CorsPolicy::from_config(&config),
            Err(AppError::ConfigError(_))
        ));
    }
}
