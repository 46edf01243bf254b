use crate::services::dispatch::DispatchPolicy;
use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::time::Duration;

const DEFAULT_FAL_SYNC_BASE_URL: &str = "https://fal.run";
const DEFAULT_FAL_QUEUE_BASE_URL: &str = "https://queue.fal.run";
const DEFAULT_BLOB_BASE_URL: &str = "https://blob.vercel-storage.com";
const DEFAULT_FASHN_BASE_URL: &str = "https://api.fashn.ai";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Upper bound for an upstream dispatch or status call.
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 60;
const DEFAULT_BLOB_TIMEOUT_SECS: u64 = 30;

/// Inline media makes request bodies large; 25MB covers a handful of photos.
const DEFAULT_MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub common: core_config::Config,
    pub fal: FalConfig,
    pub blob: BlobConfig,
    pub fashn: ProviderConfig,
    pub openai: ProviderConfig,
    pub cors: CorsConfig,
    pub max_body_bytes: usize,
    pub otlp_endpoint: Option<String>,
}

/// Inference upstream reached through `/api/fal`.
#[derive(Debug, Clone)]
pub struct FalConfig {
    pub api_key: Option<Secret<String>>,
    pub sync_base_url: String,
    pub queue_base_url: String,
    /// Prefixes a caller-supplied status URL must start with.
    pub status_url_prefixes: Vec<String>,
    pub dispatch_policy: DispatchPolicy,
    pub timeout: Duration,
}

/// Object store used to offload inline media.
#[derive(Debug, Clone)]
pub struct BlobConfig {
    pub token: Option<Secret<String>>,
    pub base_url: String,
    pub api_version: String,
    pub object_prefix: String,
    pub default_extension: String,
    pub timeout: Duration,
}

/// Bearer-authenticated upstream reached through a passthrough route
/// (`/api/fashn/*path`, `/api/openai`).
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: Option<Secret<String>>,
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allow_origin: String,
    pub allow_headers: String,
}

impl ProxyConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        let upstream_timeout = Duration::from_secs(parse_env(
            "UPSTREAM_TIMEOUT_SECS",
            DEFAULT_UPSTREAM_TIMEOUT_SECS,
        )?);

        let sync_base_url = trim_base(get_env(
            "FAL_SYNC_BASE_URL",
            Some(DEFAULT_FAL_SYNC_BASE_URL),
            is_prod,
        )?);
        let queue_base_url = trim_base(get_env(
            "FAL_QUEUE_BASE_URL",
            Some(DEFAULT_FAL_QUEUE_BASE_URL),
            is_prod,
        )?);
        let status_url_prefixes = match env::var("FAL_STATUS_URL_PREFIXES") {
            Ok(raw) => parse_prefixes(&raw),
            Err(_) => default_status_prefixes(&sync_base_url, &queue_base_url),
        };
        if status_url_prefixes.is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "FAL_STATUS_URL_PREFIXES must list at least one prefix"
            )));
        }

        let dispatch_policy = env_or("FAL_DISPATCH_POLICY", "caller")
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        Ok(ProxyConfig {
            common: common_config,
            fal: FalConfig {
                api_key: secret_env("FAL_KEY"),
                sync_base_url,
                queue_base_url,
                status_url_prefixes,
                dispatch_policy,
                timeout: upstream_timeout,
            },
            blob: BlobConfig {
                token: secret_env("BLOB_READ_WRITE_TOKEN"),
                base_url: trim_base(get_env(
                    "BLOB_BASE_URL",
                    Some(DEFAULT_BLOB_BASE_URL),
                    is_prod,
                )?),
                api_version: env_or("BLOB_API_VERSION", "7"),
                object_prefix: env_or("BLOB_OBJECT_PREFIX", "avatar"),
                default_extension: env_or("BLOB_DEFAULT_EXTENSION", "png"),
                timeout: Duration::from_secs(parse_env(
                    "BLOB_TIMEOUT_SECS",
                    DEFAULT_BLOB_TIMEOUT_SECS,
                )?),
            },
            fashn: ProviderConfig {
                api_key: secret_env("FASHN_API_KEY"),
                base_url: trim_base(get_env(
                    "FASHN_BASE_URL",
                    Some(DEFAULT_FASHN_BASE_URL),
                    is_prod,
                )?),
                timeout: upstream_timeout,
            },
            openai: ProviderConfig {
                api_key: secret_env("OPENAI_API_KEY"),
                base_url: trim_base(get_env(
                    "OPENAI_BASE_URL",
                    Some(DEFAULT_OPENAI_BASE_URL),
                    is_prod,
                )?),
                timeout: upstream_timeout,
            },
            cors: CorsConfig {
                allow_origin: env_or("CORS_ALLOW_ORIGIN", "*"),
                allow_headers: env_or("CORS_ALLOW_HEADERS", "Content-Type"),
            },
            max_body_bytes: parse_env("MAX_REQUEST_BODY_BYTES", DEFAULT_MAX_BODY_BYTES)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|v| !v.is_empty()),
        })
    }
}

/// Status URLs are accepted when they point under either upstream base.
pub fn default_status_prefixes(sync_base_url: &str, queue_base_url: &str) -> Vec<String> {
    vec![
        format!("{}/", trim_base(queue_base_url.to_string())),
        format!("{}/", trim_base(sync_base_url.to_string())),
    ]
}

pub fn parse_prefixes(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            // A bare host would also match `https://fal.run.attacker.example`.
            if p.ends_with('/') {
                p.to_string()
            } else {
                format!("{}/", p)
            }
        })
        .collect()
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

fn secret_env(key: &str) -> Option<Secret<String>> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(Secret::new)
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, AppError>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| {
            AppError::ConfigError(anyhow::anyhow!("{} is invalid: {}", key, e))
        }),
        Err(_) => Ok(default),
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}
