#![allow(dead_code)]

use inference_proxy::config::ProxyConfig;
use inference_proxy::services::DispatchPolicy;
use inference_proxy::startup::{build_router, AppState, Application};
use secrecy::Secret;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::{MockServer, Request, Respond, ResponseTemplate};

pub const TEST_FAL_KEY: &str = "test-fal-key";
pub const TEST_FASHN_KEY: &str = "test-fashn-key";
pub const TEST_BLOB_TOKEN: &str = "test-blob-token";
pub const TEST_OPENAI_KEY: &str = "test-openai-key";

/// Proxy configuration pointing every upstream at `upstream`.
///
/// Inference calls land under `/sync` and `/queue`, uploads under `/blob`,
/// try-on calls under `/fashn` and chat calls under `/openai`.
pub fn test_config(upstream: &MockServer) -> ProxyConfig {
    let base = upstream.uri();

    let mut config = ProxyConfig::load().expect("Failed to load configuration");
    config.common.port = 0;

    config.fal.api_key = Some(Secret::new(TEST_FAL_KEY.to_string()));
    config.fal.sync_base_url = format!("{}/sync", base);
    config.fal.queue_base_url = format!("{}/queue", base);
    config.fal.status_url_prefixes = vec![format!("{}/queue/", base)];
    config.fal.dispatch_policy = DispatchPolicy::CallerChoice;
    config.fal.timeout = Duration::from_secs(5);

    config.blob.token = Some(Secret::new(TEST_BLOB_TOKEN.to_string()));
    config.blob.base_url = format!("{}/blob", base);
    config.blob.object_prefix = "avatar".to_string();
    config.blob.default_extension = "png".to_string();
    config.blob.timeout = Duration::from_secs(5);

    config.fashn.api_key = Some(Secret::new(TEST_FASHN_KEY.to_string()));
    config.fashn.base_url = format!("{}/fashn", base);
    config.fashn.timeout = Duration::from_secs(5);

    config.openai.api_key = Some(Secret::new(TEST_OPENAI_KEY.to_string()));
    config.openai.base_url = format!("{}/openai", base);
    config.openai.timeout = Duration::from_secs(5);

    config.cors.allow_origin = "*".to_string();
    config.cors.allow_headers = "Content-Type".to_string();

    config
}

/// Object store stand-in: `PUT` keeps the body under the request path and
/// answers with its URL, `GET` serves the stored bytes back.
#[derive(Clone)]
pub struct MemoryObjectStore {
    base_url: String,
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryObjectStore {
    pub fn new(server: &MockServer) -> Self {
        Self {
            base_url: server.uri(),
            objects: Arc::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

impl Respond for MemoryObjectStore {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let key = request.url.path().to_string();
        let mut objects = self.objects.lock().unwrap();

        match request.method.as_str() {
            "PUT" => {
                objects.insert(key.clone(), request.body.clone());
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "url": format!("{}{}", self.base_url, key) }))
            }
            "GET" => match objects.get(&key) {
                Some(bytes) => ResponseTemplate::new(200).set_body_bytes(bytes.clone()),
                None => ResponseTemplate::new(404),
            },
            _ => ResponseTemplate::new(405),
        }
    }
}

/// Router without a listener, for `oneshot` tests.
pub fn test_router(config: &ProxyConfig) -> axum::Router {
    let state = AppState::from_config(config).expect("Failed to build state");
    build_router(state, config).expect("Failed to build router")
}

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub client: reqwest::Client,
}

impl TestApp {
    pub async fn spawn(upstream: &MockServer) -> Self {
        Self::spawn_with(test_config(upstream)).await
    }

    pub async fn spawn_with(config: ProxyConfig) -> Self {
        let app = Application::build(config)
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        Self {
            address,
            port,
            client,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }
}
