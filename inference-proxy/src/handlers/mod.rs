pub mod fal;
pub mod fashn;
pub mod health;
pub mod openai;

pub use health::{health_check, metrics};

use axum::{body::Bytes, http::StatusCode};
use serde_json::Value;
use service_core::error::AppError;

/// Error envelope for a rejected request body; an oversized body stays a 413.
pub(crate) fn rejected(status: StatusCode, message: String) -> AppError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(message)
    } else {
        AppError::BadRequest(anyhow::anyhow!("Invalid request body: {}", message))
    }
}

/// Parse a forwarded body; an empty body forwards nothing.
pub(crate) fn json_body(body: &Bytes) -> Result<Option<Value>, AppError> {
    if body.is_empty() {
        return Ok(None);
    }

    serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Invalid JSON body: {}", e)))
}
