//! Offloading of inline `data:` media to an object store.
//!
//! Offload is a soft dependency: every failure is reported as
//! [`OffloadOutcome::Skipped`] carrying the original input, never as an error.

use crate::config::BlobConfig;
use async_trait::async_trait;
use base64::{
    alphabet,
    engine::{general_purpose::GeneralPurpose, DecodePaddingMode, GeneralPurposeConfig},
    Engine as _,
};
use reqwest::{header, Client};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use service_core::error::AppError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

const BASE64_MARKER: &str = ";base64,";

/// Standard alphabet; trailing `=` padding is optional on decode.
const INLINE_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Error, Debug)]
pub enum BlobError {
    #[error("blob upload request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("blob store rejected upload ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("blob store response did not contain a url")]
    MissingUrl,
}

/// Write-once object store returning a public retrieval URL.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, name: &str, content_type: &str, data: Vec<u8>)
        -> Result<String, BlobError>;
}

/// Blob store speaking the `PUT <base>/<name>` + bearer token protocol.
pub struct HttpBlobStore {
    client: Client,
    base_url: String,
    token: Secret<String>,
    api_version: String,
}

#[derive(Deserialize)]
struct PutBlobResponse {
    url: Option<String>,
}

impl HttpBlobStore {
    pub fn new(
        base_url: String,
        token: Secret<String>,
        api_version: String,
        timeout: std::time::Duration,
    ) -> Result<Self, AppError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            AppError::InternalError(anyhow::anyhow!("Failed to create blob HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            base_url,
            token,
            api_version,
        })
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn put(
        &self,
        name: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<String, BlobError> {
        let response = self
            .client
            .put(format!("{}/{}", self.base_url, name))
            .bearer_auth(self.token.expose_secret())
            .header(header::CONTENT_TYPE, content_type)
            .header("x-api-version", &self.api_version)
            .body(data)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BlobError::Rejected {
                status: status.as_u16(),
                body: crate::services::upstream::excerpt(&body),
            });
        }

        let parsed: PutBlobResponse = response.json().await?;
        parsed.url.ok_or(BlobError::MissingUrl)
    }
}

/// Parsed `data:<mime>;base64,<payload>` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri<'a> {
    pub mime_type: &'a str,
    pub payload: &'a str,
}

pub fn parse_data_uri(input: &str) -> Option<DataUri<'_>> {
    let rest = input.strip_prefix("data:")?;
    let (mime_type, payload) = rest.split_once(BASE64_MARKER)?;
    if mime_type.is_empty() || payload.is_empty() {
        return None;
    }
    Some(DataUri { mime_type, payload })
}

/// File extension for a MIME type: its subtype, else `default`.
///
/// `image/svg+xml` yields `svg`; `image/` or `png` yield `default`.
pub fn extension_for(mime_type: &str, default: &str) -> String {
    mime_type
        .split_once('/')
        .map(|(_, subtype)| subtype)
        .and_then(|subtype| subtype.split([';', '+']).next())
        .map(str::trim)
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| default.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NotConfigured,
    Malformed,
    UploadFailed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotConfigured => write!(f, "offload store not configured"),
            SkipReason::Malformed => write!(f, "not a base64 data URI"),
            SkipReason::UploadFailed(cause) => write!(f, "upload failed: {}", cause),
        }
    }
}

impl SkipReason {
    fn metric_label(&self) -> &'static str {
        match self {
            SkipReason::NotConfigured => "skipped_not_configured",
            SkipReason::Malformed => "skipped_malformed",
            SkipReason::UploadFailed(_) => "skipped_upload_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OffloadOutcome {
    Offloaded(String),
    Skipped { original: String, reason: SkipReason },
}

/// Uploads decoded data URIs and hands back their retrieval URLs.
#[derive(Clone)]
pub struct BlobOffloader {
    store: Option<Arc<dyn BlobStore>>,
    object_prefix: String,
    default_extension: String,
}

impl BlobOffloader {
    pub fn new(
        store: Option<Arc<dyn BlobStore>>,
        object_prefix: impl Into<String>,
        default_extension: impl Into<String>,
    ) -> Self {
        Self {
            store,
            object_prefix: object_prefix.into(),
            default_extension: default_extension.into(),
        }
    }

    /// Offloader backed by [`HttpBlobStore`], or a pass-through one when no
    /// write token is configured.
    pub fn from_config(config: &BlobConfig) -> Result<Self, AppError> {
        let store: Option<Arc<dyn BlobStore>> = match &config.token {
            Some(token) => Some(Arc::new(HttpBlobStore::new(
                config.base_url.clone(),
                token.clone(),
                config.api_version.clone(),
                config.timeout,
            )?)),
            None => None,
        };

        Ok(Self::new(
            store,
            config.object_prefix.clone(),
            config.default_extension.clone(),
        ))
    }

    pub fn is_configured(&self) -> bool {
        self.store.is_some()
    }

    pub async fn offload(&self, data_uri: &str) -> OffloadOutcome {
        let outcome = self.try_offload(data_uri).await;

        let label = match &outcome {
            OffloadOutcome::Offloaded(_) => "offloaded",
            OffloadOutcome::Skipped { reason, .. } => reason.metric_label(),
        };
        metrics::counter!("proxy_offload_total", "outcome" => label).increment(1);

        outcome
    }

    async fn try_offload(&self, data_uri: &str) -> OffloadOutcome {
        let skipped = |reason| OffloadOutcome::Skipped {
            original: data_uri.to_string(),
            reason,
        };

        let Some(store) = &self.store else {
            return skipped(SkipReason::NotConfigured);
        };

        let Some(parsed) = parse_data_uri(data_uri) else {
            return skipped(SkipReason::Malformed);
        };

        let data = match INLINE_BASE64.decode(parsed.payload) {
            Ok(data) => data,
            Err(e) => {
                tracing::debug!(error = %e, "Inline media payload is not valid base64");
                return skipped(SkipReason::Malformed);
            }
        };

        let extension = extension_for(parsed.mime_type, &self.default_extension);
        let name = self.object_name(&extension);
        let size = data.len();

        match store.put(&name, parsed.mime_type, data).await {
            Ok(url) => {
                tracing::info!(
                    object = %name,
                    mime_type = %parsed.mime_type,
                    size = size,
                    "Offloaded inline media"
                );
                OffloadOutcome::Offloaded(url)
            }
            Err(e) => skipped(SkipReason::UploadFailed(e.to_string())),
        }
    }

    /// `<prefix>-<unix millis>-<random>.<ext>`; the suffix keeps names unique
    /// when several elements of one request land in the same millisecond.
    fn object_name(&self, extension: &str) -> String {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!(
            "{}-{}-{}.{}",
            self.object_prefix,
            chrono::Utc::now().timestamp_millis(),
            &suffix[..8],
            extension
        )
    }
}
