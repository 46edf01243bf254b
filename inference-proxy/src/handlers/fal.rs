use super::rejected;
use crate::dtos::{DispatchRequest, StatusByIdQuery, StatusQuery};
use crate::services::{StatusTarget, UpstreamReply};
use crate::startup::AppState;
use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    Json,
};
use serde_json::Value;
use service_core::error::AppError;

pub async fn dispatch(
    State(state): State<AppState>,
    body: Result<Json<DispatchRequest>, JsonRejection>,
) -> Result<UpstreamReply, AppError> {
    // Checked before any media is uploaded.
    state.dispatcher.credential()?;

    let Json(request) = body.map_err(|e| rejected(e.status(), e.body_text()))?;

    if request.operation_path.trim().is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Missing operationPath"
        )));
    }

    let payload = match request.payload {
        Value::Object(map) => map,
        Value::Null => {
            return Err(AppError::BadRequest(anyhow::anyhow!("Missing payload")));
        }
        _ => {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "payload must be a JSON object"
            )));
        }
    };

    let payload = Value::Object(state.normalizer.normalize(payload).await);

    state
        .dispatcher
        .dispatch(&request.operation_path, &payload, request.dispatch_mode)
        .await
}

pub async fn status(
    State(state): State<AppState>,
    query: Result<Query<StatusQuery>, QueryRejection>,
) -> Result<UpstreamReply, AppError> {
    let Query(query) = query.map_err(|e| AppError::BadRequest(anyhow::anyhow!(e.body_text())))?;
    let target = StatusTarget::from_parts(query.url, query.request_id, query.path)?;

    state.status.fetch(&target).await
}

pub async fn status_by_id(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
    query: Result<Query<StatusByIdQuery>, QueryRejection>,
) -> Result<UpstreamReply, AppError> {
    let Query(query) = query.map_err(|e| AppError::BadRequest(anyhow::anyhow!(e.body_text())))?;
    let target = StatusTarget::from_parts(None, Some(request_id), query.path)?;

    state.status.fetch(&target).await
}
