use crate::services::DispatchMode;
use serde::Deserialize;
use serde_json::Value;

/// Body of `POST /api/fal`.
#[derive(Debug, Deserialize)]
pub struct DispatchRequest {
    #[serde(rename = "operationPath", alias = "path", default)]
    pub operation_path: String,
    #[serde(alias = "body", default)]
    pub payload: Value,
    #[serde(rename = "dispatchMode", default)]
    pub dispatch_mode: Option<DispatchMode>,
}

/// Query of `GET /api/fal/status`.
#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    pub url: Option<String>,
    pub request_id: Option<String>,
    pub path: Option<String>,
}

/// Query of `GET /api/fal/status/:id`.
#[derive(Debug, Default, Deserialize)]
pub struct StatusByIdQuery {
    pub path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_current_field_names() {
        let req: DispatchRequest = serde_json::from_value(json!({
            "operationPath": "/fal-ai/flux",
            "payload": { "prompt": "x" },
            "dispatchMode": "async",
        }))
        .unwrap();

        assert_eq!(req.operation_path, "/fal-ai/flux");
        assert_eq!(req.payload["prompt"], "x");
        assert_eq!(req.dispatch_mode, Some(DispatchMode::Async));
    }

    #[test]
    fn accepts_legacy_field_names() {
        let req: DispatchRequest = serde_json::from_value(json!({
            "path": "/fal-ai/flux",
            "body": { "prompt": "x" },
        }))
        .unwrap();

        assert_eq!(req.operation_path, "/fal-ai/flux");
        assert_eq!(req.payload["prompt"], "x");
        assert_eq!(req.dispatch_mode, None);
    }

    #[test]
    fn unknown_dispatch_mode_is_rejected() {
        let result: Result<DispatchRequest, _> = serde_json::from_value(json!({
            "operationPath": "/m",
            "payload": {},
            "dispatchMode": "later",
        }));
        assert!(result.is_err());
    }
}
