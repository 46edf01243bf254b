use super::{json_body, rejected};
use crate::services::UpstreamReply;
use crate::startup::AppState;
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::Method,
};
use service_core::error::AppError;

/// `POST /api/openai`: forwards the body to the chat completions route.
pub async fn chat_completions(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<UpstreamReply, AppError> {
    state.openai.credential()?;

    let body = body.map_err(|e| rejected(e.status(), e.body_text()))?;
    let Some(json) = json_body(&body)? else {
        return Err(AppError::BadRequest(anyhow::anyhow!("Missing request body")));
    };

    state.openai.forward(Method::POST, "", Some(&json)).await
}
