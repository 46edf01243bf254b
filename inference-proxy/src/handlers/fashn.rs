use super::{json_body, rejected};
use crate::services::UpstreamReply;
use crate::startup::AppState;
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, Path, State},
    http::Method,
};
use service_core::error::AppError;

/// `/api/fashn`: forwards to the default run route.
pub async fn forward_root(
    State(state): State<AppState>,
    method: Method,
    body: Result<Bytes, BytesRejection>,
) -> Result<UpstreamReply, AppError> {
    forward_to(state, method, "", body).await
}

/// `/api/fashn/*path`: forwards path-for-path.
pub async fn forward(
    State(state): State<AppState>,
    method: Method,
    Path(path): Path<String>,
    body: Result<Bytes, BytesRejection>,
) -> Result<UpstreamReply, AppError> {
    forward_to(state, method, &path, body).await
}

async fn forward_to(
    state: AppState,
    method: Method,
    path: &str,
    body: Result<Bytes, BytesRejection>,
) -> Result<UpstreamReply, AppError> {
    state.fashn.credential()?;

    let body = body.map_err(|e| rejected(e.status(), e.body_text()))?;
    let json = if method == Method::POST {
        json_body(&body)?
    } else {
        None
    };

    state.fashn.forward(method, path, json.as_ref()).await
}
