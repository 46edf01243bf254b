//! Job status resolution against the queueing upstream.

use crate::config::FalConfig;
use crate::services::dispatch::join_path;
use crate::services::upstream::{UpstreamAuth, UpstreamClient, UpstreamReply};
use reqwest::Method;
use service_core::error::AppError;

/// What the caller handed back to locate a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusTarget {
    /// Status URL previously returned by the upstream.
    Url(String),
    /// Job id plus the operation path it was submitted under.
    Job {
        request_id: String,
        operation_path: String,
    },
}

impl StatusTarget {
    /// Build a target from the optional inbound parameters.
    ///
    /// Exactly one shape must be present. Empty strings count as absent.
    pub fn from_parts(
        url: Option<String>,
        request_id: Option<String>,
        operation_path: Option<String>,
    ) -> Result<Self, AppError> {
        let present = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

        match (
            present(url),
            present(request_id),
            present(operation_path),
        ) {
            (Some(url), None, None) => Ok(StatusTarget::Url(url)),
            (Some(_), _, _) => Err(AppError::BadRequest(anyhow::anyhow!(
                "Provide either url or request_id and path, not both"
            ))),
            (None, Some(request_id), Some(operation_path)) => {
                validate_request_id(&request_id)?;
                Ok(StatusTarget::Job {
                    request_id,
                    operation_path,
                })
            }
            (None, Some(_), None) => Err(AppError::BadRequest(anyhow::anyhow!(
                "Missing path parameter"
            ))),
            (None, None, _) => Err(AppError::BadRequest(anyhow::anyhow!(
                "Missing url parameter or request_id and path"
            ))),
        }
    }
}

/// Job ids are spliced into a URL path, so they must stay one segment.
fn validate_request_id(request_id: &str) -> Result<(), AppError> {
    let valid = request_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && request_id != "."
        && request_id != "..";
    if valid {
        Ok(())
    } else {
        Err(AppError::BadRequest(anyhow::anyhow!("Invalid request_id")))
    }
}

#[derive(Clone)]
pub struct StatusResolver {
    config: FalConfig,
    upstream: UpstreamClient,
}

impl StatusResolver {
    pub fn new(config: FalConfig, upstream: UpstreamClient) -> Self {
        Self { config, upstream }
    }

    pub fn credential(&self) -> Result<UpstreamAuth, AppError> {
        self.config
            .api_key
            .clone()
            .map(UpstreamAuth::Key)
            .ok_or_else(|| AppError::ConfigError(anyhow::anyhow!("FAL_KEY not configured")))
    }

    /// Canonical status URL for `target`.
    ///
    /// Caller-supplied URLs must start with an allowlisted prefix so the proxy
    /// cannot be pointed at arbitrary hosts.
    pub fn status_url(&self, target: &StatusTarget) -> Result<String, AppError> {
        match target {
            StatusTarget::Url(url) => {
                if self
                    .config
                    .status_url_prefixes
                    .iter()
                    .any(|prefix| url.starts_with(prefix.as_str()))
                {
                    Ok(url.clone())
                } else {
                    tracing::warn!(url = %url, "Rejected status URL outside the allowlist");
                    Err(AppError::BadRequest(anyhow::anyhow!("Invalid status URL")))
                }
            }
            StatusTarget::Job {
                request_id,
                operation_path,
            } => Ok(format!(
                "{}/requests/{}/status",
                join_path(
                    &self.config.queue_base_url,
                    operation_path.trim_end_matches('/')
                ),
                request_id
            )),
        }
    }

    pub async fn fetch(&self, target: &StatusTarget) -> Result<UpstreamReply, AppError> {
        let auth = self.credential()?;
        let url = self.status_url(target)?;

        tracing::debug!(url = %url, "Checking job status");

        let reply = self.upstream.send(Method::GET, &url, &auth, None).await?;

        metrics::counter!(
            "proxy_upstream_responses_total",
            "operation" => "status",
            "status" => reply.status.as_u16().to_string()
        )
        .increment(1);

        Ok(reply)
    }
}
