//! Dispatch of inference requests to the synchronous or queueing upstream.

use crate::config::FalConfig;
use crate::services::upstream::{UpstreamAuth, UpstreamClient, UpstreamReply};
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use service_core::error::AppError;
use std::str::FromStr;

/// How the caller wants the job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Block until the result is ready.
    Sync,
    /// Enqueue and return a job handle.
    Async,
}

impl DispatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchMode::Sync => "sync",
            DispatchMode::Async => "async",
        }
    }
}

/// Deployment-wide rule for picking the upstream base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPolicy {
    /// Queue only when the caller asks for `async`.
    CallerChoice,
    /// Queue every request.
    AlwaysQueue,
}

impl DispatchPolicy {
    pub fn resolve(self, requested: Option<DispatchMode>) -> DispatchMode {
        match self {
            DispatchPolicy::AlwaysQueue => DispatchMode::Async,
            DispatchPolicy::CallerChoice => requested.unwrap_or(DispatchMode::Sync),
        }
    }
}

impl FromStr for DispatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "caller" | "caller-choice" => Ok(DispatchPolicy::CallerChoice),
            "always-queue" | "queue" => Ok(DispatchPolicy::AlwaysQueue),
            _ => Err(format!("Invalid dispatch policy: {}", s)),
        }
    }
}

/// `base` + `path`, with exactly one slash between them.
pub fn join_path(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

#[derive(Clone)]
pub struct DispatchRouter {
    config: FalConfig,
    upstream: UpstreamClient,
}

impl DispatchRouter {
    pub fn new(config: FalConfig, upstream: UpstreamClient) -> Self {
        Self { config, upstream }
    }

    /// The upstream credential, or a configuration error.
    ///
    /// Callers check this before doing any other work for the request.
    pub fn credential(&self) -> Result<UpstreamAuth, AppError> {
        self.config
            .api_key
            .clone()
            .map(UpstreamAuth::Key)
            .ok_or_else(|| AppError::ConfigError(anyhow::anyhow!("FAL_KEY not configured")))
    }

    pub fn target_url(&self, mode: DispatchMode, operation_path: &str) -> String {
        let base = match mode {
            DispatchMode::Sync => &self.config.sync_base_url,
            DispatchMode::Async => &self.config.queue_base_url,
        };
        join_path(base, operation_path)
    }

    /// POST `payload` to the upstream chosen by the dispatch policy.
    ///
    /// Non-2xx JSON answers are returned as-is; only transport failures are
    /// errors.
    pub async fn dispatch(
        &self,
        operation_path: &str,
        payload: &Value,
        requested: Option<DispatchMode>,
    ) -> Result<UpstreamReply, AppError> {
        let auth = self.credential()?;
        let mode = self.config.dispatch_policy.resolve(requested);
        let url = self.target_url(mode, operation_path);

        tracing::info!(
            operation = %operation_path,
            mode = mode.as_str(),
            requested = requested.map(|m| m.as_str()).unwrap_or("unspecified"),
            "Dispatching inference request"
        );
        metrics::counter!("proxy_dispatch_total", "mode" => mode.as_str()).increment(1);

        let reply = self
            .upstream
            .send(Method::POST, &url, &auth, Some(payload))
            .await?;

        metrics::counter!(
            "proxy_upstream_responses_total",
            "operation" => "dispatch",
            "status" => reply.status.as_u16().to_string()
        )
        .increment(1);

        Ok(reply)
    }
}
