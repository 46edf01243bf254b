//! Media normalization for inference payloads.
//!
//! Replaces inline `data:` values in the recognized media fields with offloaded
//! URLs before the payload is dispatched upstream.

use crate::services::blob::{BlobOffloader, OffloadOutcome};
use futures::future::join_all;
use serde_json::{Map, Value};

pub const INLINE_DATA_PREFIX: &str = "data:";

/// Scalar fields that may carry a single image.
pub const SCALAR_MEDIA_FIELDS: [&str; 2] = ["image", "image_url"];

/// Sequence field carrying an ordered list of images.
pub const SEQUENCE_MEDIA_FIELD: &str = "image_urls";

pub fn is_inline_data(value: &str) -> bool {
    value.starts_with(INLINE_DATA_PREFIX)
}

#[derive(Clone)]
pub struct MediaNormalizer {
    offloader: BlobOffloader,
}

impl MediaNormalizer {
    pub fn new(offloader: BlobOffloader) -> Self {
        Self { offloader }
    }

    /// Offload every inline media value in `payload`.
    ///
    /// All matched values, scalar or sequence element, are uploaded
    /// concurrently. Never fails: values that could not be offloaded are kept
    /// as they were.
    pub async fn normalize(&self, mut payload: Map<String, Value>) -> Map<String, Value> {
        let [image_field, image_url_field] = SCALAR_MEDIA_FIELDS;

        let (image, image_url, image_urls) = futures::join!(
            self.normalize_scalar(image_field, payload.get(image_field)),
            self.normalize_scalar(image_url_field, payload.get(image_url_field)),
            self.normalize_sequence(payload.get(SEQUENCE_MEDIA_FIELD)),
        );

        for (field, replacement) in [
            (image_field, image),
            (image_url_field, image_url),
            (SEQUENCE_MEDIA_FIELD, image_urls),
        ] {
            if let Some(value) = replacement {
                payload.insert(field.to_string(), value);
            }
        }

        payload
    }

    /// Replacement for a scalar field, or `None` when it needs no change.
    async fn normalize_scalar(&self, field: &str, value: Option<&Value>) -> Option<Value> {
        match value {
            Some(Value::String(s)) if is_inline_data(s) => {
                Some(Value::String(self.resolve(field, s).await))
            }
            _ => None,
        }
    }

    /// Replacement for the sequence field, preserving order, nulls and
    /// non-inline entries.
    async fn normalize_sequence(&self, value: Option<&Value>) -> Option<Value> {
        let Some(Value::Array(items)) = value else {
            return None;
        };

        let inline_count = items
            .iter()
            .filter(|item| matches!(item, Value::String(s) if is_inline_data(s)))
            .count();
        if inline_count == 0 {
            return None;
        }

        tracing::debug!(
            total = items.len(),
            inline = inline_count,
            "Offloading inline entries of {}",
            SEQUENCE_MEDIA_FIELD
        );

        let resolved = join_all(items.iter().map(|item| async move {
            match item {
                Value::String(s) if is_inline_data(s) => {
                    Value::String(self.resolve(SEQUENCE_MEDIA_FIELD, s).await)
                }
                other => other.clone(),
            }
        }))
        .await;

        Some(Value::Array(resolved))
    }

    async fn resolve(&self, field: &str, data_uri: &str) -> String {
        match self.offloader.offload(data_uri).await {
            OffloadOutcome::Offloaded(url) => url,
            OffloadOutcome::Skipped { original, reason } => {
                tracing::warn!(
                    field = %field,
                    reason = %reason,
                    "Forwarding inline media without offload"
                );
                original
            }
        }
    }
}
