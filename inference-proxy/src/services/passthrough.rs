//! Forwarding to bearer-authenticated provider upstreams.

use crate::config::ProviderConfig;
use crate::services::dispatch::join_path;
use crate::services::upstream::{UpstreamAuth, UpstreamClient, UpstreamReply};
use reqwest::Method;
use serde_json::Value;
use service_core::error::AppError;

/// Fixed facts about one provider route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderRoute {
    /// Metric label and log name.
    pub name: &'static str,
    /// Environment variable holding the key, named in configuration errors.
    pub key_var: &'static str,
    /// Upstream path used when the caller gives none.
    pub default_path: &'static str,
}

/// Virtual try-on. Job status lives at `v1/status/<id>` on the same
/// upstream, so status polling is an ordinary `GET` through the route.
pub const FASHN: ProviderRoute = ProviderRoute {
    name: "fashn",
    key_var: "FASHN_API_KEY",
    default_path: "/v1/run",
};

/// Chat completions.
pub const OPENAI: ProviderRoute = ProviderRoute {
    name: "openai",
    key_var: "OPENAI_API_KEY",
    default_path: "/v1/chat/completions",
};

#[derive(Clone)]
pub struct ProviderPassthrough {
    route: ProviderRoute,
    config: ProviderConfig,
    upstream: UpstreamClient,
}

impl ProviderPassthrough {
    pub fn new(route: ProviderRoute, config: ProviderConfig, upstream: UpstreamClient) -> Self {
        Self {
            route,
            config,
            upstream,
        }
    }

    pub fn credential(&self) -> Result<UpstreamAuth, AppError> {
        self.config
            .api_key
            .clone()
            .map(UpstreamAuth::Bearer)
            .ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!("{} not configured", self.route.key_var))
            })
    }

    pub fn target_url(&self, path: &str) -> String {
        let path = path.trim_matches('/');
        if path.is_empty() {
            join_path(&self.config.base_url, self.route.default_path)
        } else {
            join_path(&self.config.base_url, path)
        }
    }

    pub async fn forward(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<UpstreamReply, AppError> {
        let auth = self.credential()?;
        let url = self.target_url(path);

        tracing::info!(provider = self.route.name, %method, path = %path, "Forwarding to provider");

        let reply = self.upstream.send(method, &url, &auth, body).await?;

        metrics::counter!(
            "proxy_upstream_responses_total",
            "operation" => self.route.name,
            "status" => reply.status.as_u16().to_string()
        )
        .increment(1);

        Ok(reply)
    }
}
