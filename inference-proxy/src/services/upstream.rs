//! Outbound HTTP to inference upstreams.
//!
//! Every upstream answer goes through [`UpstreamBody::parse`], so the dispatch,
//! status and passthrough paths agree on what a non-JSON reply means.

use reqwest::{header::AUTHORIZATION, Client, Method, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde_json::Value;
use service_core::error::AppError;
use service_core::observability::TracedRequestExt;
use std::time::Duration;

/// Maximum number of characters of a non-JSON body echoed to the caller.
pub const EXCERPT_LIMIT: usize = 500;

/// Credential scheme expected by an upstream.
#[derive(Debug, Clone)]
pub enum UpstreamAuth {
    /// `Authorization: Key <secret>`
    Key(Secret<String>),
    /// `Authorization: Bearer <secret>`
    Bearer(Secret<String>),
}

impl UpstreamAuth {
    fn header_value(&self) -> String {
        match self {
            UpstreamAuth::Key(secret) => format!("Key {}", secret.expose_secret()),
            UpstreamAuth::Bearer(secret) => format!("Bearer {}", secret.expose_secret()),
        }
    }
}

/// Upstream body after the parse-or-diagnostic step.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamBody {
    Parsed(Value),
    Unparseable {
        excerpt: String,
        upstream_status: StatusCode,
    },
}

impl UpstreamBody {
    pub fn parse(status: StatusCode, raw: &str) -> Self {
        match serde_json::from_str(raw) {
            Ok(value) => UpstreamBody::Parsed(value),
            Err(_) => UpstreamBody::Unparseable {
                excerpt: excerpt(raw),
                upstream_status: status,
            },
        }
    }
}

/// Status code and body relayed back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamReply {
    pub status: StatusCode,
    pub body: UpstreamBody,
}

/// First [`EXCERPT_LIMIT`] characters of `raw`, cut on a char boundary.
pub fn excerpt(raw: &str) -> String {
    match raw.char_indices().nth(EXCERPT_LIMIT) {
        Some((idx, _)) => raw[..idx].to_string(),
        None => raw.to_string(),
    }
}

/// Thin wrapper over a timeout-bounded `reqwest::Client`.
#[derive(Clone)]
pub struct UpstreamClient {
    client: Client,
    timeout: Duration,
}

impl UpstreamClient {
    pub fn new(timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            AppError::InternalError(anyhow::anyhow!("Failed to create HTTP client: {}", e))
        })?;

        Ok(Self { client, timeout })
    }

    /// Issue one request and classify the outcome. Never retries.
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        auth: &UpstreamAuth,
        body: Option<&Value>,
    ) -> Result<UpstreamReply, AppError> {
        let mut request = self
            .client
            .request(method.clone(), url)
            .header(AUTHORIZATION, auth.header_value());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.with_trace_context().send().await.map_err(|e| {
            tracing::error!(%method, url = %url, error = %e, "Upstream request failed");
            if e.is_timeout() {
                AppError::Timeout(format!("no response from {} within {:?}", url, self.timeout))
            } else {
                AppError::Transport(anyhow::anyhow!(e))
            }
        })?;

        let status = response.status();
        let raw = response.text().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(format!("body from {} not received within {:?}", url, self.timeout))
            } else {
                AppError::Transport(anyhow::anyhow!("Failed to read upstream body: {}", e))
            }
        })?;

        let body = UpstreamBody::parse(status, &raw);
        match &body {
            UpstreamBody::Parsed(_) => {
                tracing::debug!(%method, url = %url, status = status.as_u16(), "Upstream responded");
            }
            UpstreamBody::Unparseable { .. } => {
                tracing::warn!(
                    %method,
                    url = %url,
                    status = status.as_u16(),
                    body_len = raw.len(),
                    "Upstream returned non-JSON body"
                );
            }
        }

        Ok(UpstreamReply { status, body })
    }
}
