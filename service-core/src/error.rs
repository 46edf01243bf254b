use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),

    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// The upstream answered with a body that is not JSON.
    #[error("Upstream returned non-JSON response (status {upstream_status})")]
    UpstreamContract { upstream_status: u16, excerpt: String },

    #[error("Upstream request failed: {0}")]
    Transport(anyhow::Error),

    #[error("Upstream request timed out: {0}")]
    Timeout(String),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::UpstreamContract { .. } => StatusCode::BAD_GATEWAY,
            AppError::Transport(_) | AppError::Timeout(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            details: Option<String>,
            #[serde(skip_serializing_if = "Option::is_none")]
            status: Option<u16>,
            #[serde(skip_serializing_if = "Option::is_none")]
            body: Option<String>,
        }

        let status = self.status_code();
        let response = match self {
            AppError::ConfigError(err) => ErrorResponse {
                error: "Configuration error".to_string(),
                details: Some(err.to_string()),
                status: None,
                body: None,
            },
            AppError::BadRequest(err) | AppError::NotFound(err) => ErrorResponse {
                error: err.to_string(),
                details: None,
                status: None,
                body: None,
            },
            AppError::MethodNotAllowed(method) => ErrorResponse {
                error: "Method not allowed".to_string(),
                details: Some(method),
                status: None,
                body: None,
            },
            AppError::PayloadTooLarge(details) => ErrorResponse {
                error: "Request body too large".to_string(),
                details: Some(details),
                status: None,
                body: None,
            },
            AppError::UpstreamContract {
                upstream_status,
                excerpt,
            } => ErrorResponse {
                error: "Upstream returned non-JSON response".to_string(),
                details: None,
                status: Some(upstream_status),
                body: Some(excerpt),
            },
            AppError::Transport(err) => ErrorResponse {
                error: "Upstream request failed".to_string(),
                details: Some(err.to_string()),
                status: None,
                body: None,
            },
            AppError::Timeout(msg) => ErrorResponse {
                error: "Upstream request timed out".to_string(),
                details: Some(msg),
                status: None,
                body: None,
            },
            AppError::InternalError(err) => ErrorResponse {
                error: "Internal server error".to_string(),
                details: Some(format!("{:#}", err)),
                status: None,
                body: None,
            },
        };

        (status, Json(response)).into_response()
    }
}
