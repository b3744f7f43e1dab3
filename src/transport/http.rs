use crate::transport::TransportError;
use crate::{Error, ErrorContext, Result};
use reqwest::header::{HeaderMap, ACCEPT, CACHE_CONTROL, RETRY_AFTER};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::env;
use std::time::Duration;
use url::Url;

/// Connection settings for one [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Total per-request timeout. `None` disables it (used for event streams).
    pub request_timeout: Option<Duration>,
    pub connect_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout: Some(Duration::from_secs(120)),
            connect_timeout: Duration::from_secs(10),
            pool_max_idle_per_host: 8,
            pool_idle_timeout: Duration::from_secs(90),
        }
    }
}

impl TransportConfig {
    /// Defaults with env overrides applied:
    /// `OPENCODE_HTTP_TIMEOUT_SECS`, `OPENCODE_CONNECT_TIMEOUT_SECS`,
    /// `OPENCODE_HTTP_POOL_MAX_IDLE_PER_HOST`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            request_timeout: env_u64("OPENCODE_HTTP_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .or(defaults.request_timeout),
            connect_timeout: env_u64("OPENCODE_CONNECT_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
            pool_max_idle_per_host: env_u64("OPENCODE_HTTP_POOL_MAX_IDLE_PER_HOST")
                .map(|n| n as usize)
                .unwrap_or(defaults.pool_max_idle_per_host),
            pool_idle_timeout: defaults.pool_idle_timeout,
        }
    }

    /// Settings for long-lived event streams: same connect timeout, no total timeout.
    pub fn for_streaming(&self) -> Self {
        Self {
            request_timeout: None,
            ..self.clone()
        }
    }
}

fn env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|s| s.trim().parse::<u64>().ok())
}

/// Thin reqwest wrapper bound to one backend base URL.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(base_url: &str, config: &TransportConfig) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(TransportError::InvalidUrl(base_url.to_string()).into());
        }

        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(Some(config.pool_idle_timeout));
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Base URL with `segments` appended; each segment is percent-encoded.
    pub fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client.request(method, url)
    }

    /// Same as [`request`](Self::request) with the headers an SSE endpoint expects.
    pub fn stream_request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
    }

    /// Send the request and turn non-success statuses into [`Error::Remote`].
    pub async fn dispatch(&self, request: RequestBuilder) -> Result<Response> {
        let resp = request.send().await.map_err(TransportError::Http)?;
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status().as_u16();
        let retry_after_ms = retry_after_ms(resp.headers());
        let body = resp.text().await.unwrap_or_default();
        Err(Error::Remote {
            status,
            message: remote_message(&body),
            retry_after_ms,
        })
    }

    /// Read the whole body and decode it as JSON.
    ///
    /// A body that cannot be decoded is a protocol failure, not a transport one.
    pub async fn decode_json<T: DeserializeOwned>(resp: Response, endpoint: &str) -> Result<T> {
        let bytes = resp.bytes().await.map_err(TransportError::Http)?;
        serde_json::from_slice(&bytes).map_err(|e| {
            Error::protocol_with_context(
                format!("Failed to parse response JSON: {}", e),
                ErrorContext::new()
                    .with_details(endpoint.to_string())
                    .with_source("json_parse"),
            )
        })
    }
}

/// Best-effort parsing of `Retry-After: <seconds>`.
fn retry_after_ms(headers: &HeaderMap) -> Option<u64> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?;
    let secs: u64 = raw.trim().parse().ok()?;
    Some(secs.saturating_mul(1000))
}

/// Prefer `{"message": ..}` / `{"error": ..}` from a JSON error body, else the raw text.
fn remote_message(body: &str) -> String {
    let trimmed = body.trim();
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(trimmed) {
        let picked = json
            .get("message")
            .and_then(|v| v.as_str())
            .or_else(|| json.get("error").and_then(|v| v.as_str()))
            .or_else(|| {
                json.get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(|v| v.as_str())
            });
        if let Some(msg) = picked {
            return msg.to_string();
        }
    }
    trimmed.to_string()
}
