//! Application startup and lifecycle management.

use crate::config::ProxyConfig;
use crate::envelope::{envelope_middleware, not_found, CorsPolicy, MethodGate};
use crate::handlers;
use crate::services::passthrough::{FASHN, OPENAI};
use crate::services::{
    BlobOffloader, DispatchRouter, MediaNormalizer, ProviderPassthrough, StatusResolver,
    UpstreamClient,
};
use axum::{
    extract::DefaultBodyLimit,
    http::Method,
    middleware::{from_fn, from_fn_with_state},
    routing::{any, get},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware,
    tracing::{request_id_middleware, REQUEST_ID_HEADER},
};
use std::future::IntoFuture;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub normalizer: MediaNormalizer,
    pub dispatcher: DispatchRouter,
    pub status: StatusResolver,
    pub fashn: ProviderPassthrough,
    pub openai: ProviderPassthrough,
}

impl AppState {
    pub fn from_config(config: &ProxyConfig) -> Result<Self, AppError> {
        let offloader = BlobOffloader::from_config(&config.blob)?;
        if offloader.is_configured() {
            tracing::info!(base_url = %config.blob.base_url, "Inline media offload enabled");
        } else {
            tracing::warn!(
                "BLOB_READ_WRITE_TOKEN not configured - inline media will be forwarded as-is"
            );
        }

        if config.fal.api_key.is_none() {
            tracing::warn!("FAL_KEY not configured - /api/fal requests will fail");
        }
        if config.fashn.api_key.is_none() {
            tracing::warn!("FASHN_API_KEY not configured - /api/fashn requests will fail");
        }
        if config.openai.api_key.is_none() {
            tracing::warn!("OPENAI_API_KEY not configured - /api/openai requests will fail");
        }

        let fal_upstream = UpstreamClient::new(config.fal.timeout)?;
        let fashn_upstream = UpstreamClient::new(config.fashn.timeout)?;
        let openai_upstream = UpstreamClient::new(config.openai.timeout)?;

        tracing::info!(
            sync_base_url = %config.fal.sync_base_url,
            queue_base_url = %config.fal.queue_base_url,
            dispatch_policy = ?config.fal.dispatch_policy,
            "Initialized inference upstream"
        );

        Ok(Self {
            normalizer: MediaNormalizer::new(offloader),
            dispatcher: DispatchRouter::new(config.fal.clone(), fal_upstream.clone()),
            status: StatusResolver::new(config.fal.clone(), fal_upstream),
            fashn: ProviderPassthrough::new(FASHN, config.fashn.clone(), fashn_upstream),
            openai: ProviderPassthrough::new(OPENAI, config.openai.clone(), openai_upstream),
        })
    }
}

/// Wrap every route of `router` in the method gate and, outside it, the CORS
/// layer for `methods`.
fn enveloped(router: Router<AppState>, cors: &CorsPolicy, methods: &[Method]) -> Router<AppState> {
    router
        .route_layer(from_fn_with_state(
            MethodGate::new(methods),
            envelope_middleware,
        ))
        .route_layer(cors.layer_for(methods))
}

pub fn build_router(state: AppState, config: &ProxyConfig) -> Result<Router, AppError> {
    let cors = CorsPolicy::from_config(&config.cors)?;

    let router = Router::new()
        .merge(enveloped(
            Router::new().route("/api/fal", any(handlers::fal::dispatch)),
            &cors,
            &[Method::POST],
        ))
        .merge(enveloped(
            Router::new()
                .route("/api/fal/status", any(handlers::fal::status))
                .route("/api/fal/status/:id", any(handlers::fal::status_by_id)),
            &cors,
            &[Method::GET],
        ))
        .merge(enveloped(
            Router::new()
                .route("/api/fashn", any(handlers::fashn::forward_root))
                .route("/api/fashn/*path", any(handlers::fashn::forward)),
            &cors,
            &[Method::GET, Method::POST],
        ))
        .merge(enveloped(
            Router::new().route("/api/openai", any(handlers::openai::chat_completions)),
            &cors,
            &[Method::POST],
        ))
        .merge(enveloped(
            Router::new().route("/health", any(handlers::health_check)),
            &cors,
            &[Method::GET],
        ))
        .route("/metrics", get(handlers::metrics))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .with_state(state);

    Ok(router)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    server: Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + Unpin>,
}

impl Application {
    pub async fn build(config: ProxyConfig) -> Result<Self, AppError> {
        let state = AppState::from_config(&config)?;
        let router = build_router(state, &config)?;

        // Port 0 binds a random port for tests.
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Listening on {}", port);

        let server = axum::serve(listener, router).with_graceful_shutdown(shutdown_signal());

        Ok(Self {
            port,
            server: Box::new(server.into_future()),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.server.await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
