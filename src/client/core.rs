use crate::resilience::{BackoffRetrier, RetryPolicy};
use crate::transport::HttpTransport;
use crate::Result;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Typed REST client for one backend.
///
/// Cheap to clone; clones share the connection pool. Every call is retried
/// according to the configured [`RetryPolicy`] and the error classifier.
#[derive(Clone)]
pub struct OpencodeClient {
    pub(crate) transport: Arc<HttpTransport>,
    pub(crate) retrier: BackoffRetrier,
}

impl OpencodeClient {
    /// Client for `base_url` with environment overrides and default retries.
    pub fn new(base_url: &str) -> Result<Self> {
        crate::client::builder::OpencodeClientBuilder::new()
            .base_url(base_url)
            .build()
    }

    pub fn builder() -> crate::client::builder::OpencodeClientBuilder {
        crate::client::builder::OpencodeClientBuilder::new()
    }

    pub fn base_url(&self) -> &Url {
        self.transport.base_url()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        self.retrier.policy()
    }

    pub(crate) fn url(&self, segments: &[&str]) -> Result<Url> {
        self.transport.url(segments)
    }

    /// Send a request built fresh for each attempt and decode the JSON reply.
    pub(crate) async fn execute_json<T, F>(&self, endpoint: &str, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn(&HttpTransport) -> RequestBuilder,
    {
        let transport = self.transport.as_ref();
        self.retrier
            .retry_classified(|attempt| {
                let request = build(transport);
                async move {
                    if attempt > 0 {
                        debug!(endpoint, attempt, "re-sending request");
                    }
                    let resp = transport.dispatch(request).await?;
                    HttpTransport::decode_json(resp, endpoint).await
                }
            })
            .await
    }

    /// Like [`execute_json`](Self::execute_json) for endpoints whose only answer is the status.
    pub(crate) async fn execute_status<F>(&self, endpoint: &str, build: F) -> Result<bool>
    where
        F: Fn(&HttpTransport) -> RequestBuilder,
    {
        let transport = self.transport.as_ref();
        self.retrier
            .retry_classified(|attempt| {
                let request = build(transport);
                async move {
                    if attempt > 0 {
                        debug!(endpoint, attempt, "re-sending request");
                    }
                    transport.dispatch(request).await.map(|_| true)
                }
            })
            .await
    }
}
