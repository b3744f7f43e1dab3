use crate::client::core::OpencodeClient;
use crate::resilience::{BackoffRetrier, RetryPolicy};
use crate::transport::{HttpTransport, TransportConfig};
use crate::Result;
use std::sync::Arc;
use std::time::Duration;

/// Default loopback address of a locally spawned backend.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:4096";

/// Settings for one [`OpencodeClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub transport: TransportConfig,
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            transport: TransportConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Defaults plus the `OPENCODE_*` transport overrides.
    pub fn from_env() -> Self {
        Self {
            transport: TransportConfig::from_env(),
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Builder for [`OpencodeClient`].
///
/// Keep this surface small: everything not set here comes from the
/// environment (see [`TransportConfig::from_env`]) or the defaults.
pub struct OpencodeClientBuilder {
    config: ClientConfig,
}

impl OpencodeClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::from_env(),
        }
    }

    pub fn from_config(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    /// Total timeout of one non-streaming request. Prompts without streaming can be slow.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.transport.request_timeout = Some(timeout);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.transport.connect_timeout = timeout;
        self
    }

    pub fn pool_max_idle_per_host(mut self, n: usize) -> Self {
        self.config.transport.pool_max_idle_per_host = n;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn build(self) -> Result<OpencodeClient> {
        let transport = HttpTransport::new(&self.config.base_url, &self.config.transport)?;
        Ok(OpencodeClient {
            transport: Arc::new(transport),
            retrier: BackoffRetrier::new(self.config.retry),
        })
    }
}

impl Default for OpencodeClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
