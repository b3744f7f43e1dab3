//! Mock OpenCode backend for integration tests

#![allow(dead_code)]

use mockito::{Matcher, Mock, Server, ServerGuard};
use opencode_runtime::transport::TransportConfig;
use opencode_runtime::{
    EventStreamClient, OpencodeClient, OpencodeClientBuilder, OrchestratorConfig, RetryPolicy,
    SessionOrchestrator,
};
use std::sync::Arc;
use std::time::Duration;

/// Retries with millisecond delays so failure paths stay fast.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::default()
        .with_max_attempts(3)
        .with_initial_delay(Duration::from_millis(5))
        .with_max_delay(Duration::from_millis(20))
}

/// Test fixture that manages a mock server
pub struct MockServerFixture {
    pub server: ServerGuard,
    pub base_url: String,
}

impl MockServerFixture {
    pub async fn new() -> Self {
        let server = Server::new_async().await;
        let base_url = server.url();
        Self { server, base_url }
    }

    /// Port the mock server listens on.
    pub fn port(&self) -> u16 {
        self.server
            .host_with_port()
            .rsplit(':')
            .next()
            .and_then(|p| p.parse().ok())
            .expect("mock server port")
    }

    pub fn client(&self) -> OpencodeClient {
        self.client_with(fast_retry())
    }

    pub fn client_with(&self, retry: RetryPolicy) -> OpencodeClient {
        OpencodeClientBuilder::new()
            .base_url(&self.base_url)
            .request_timeout(Duration::from_secs(5))
            .retry_policy(retry)
            .build()
            .expect("client")
    }

    pub fn events(&self) -> EventStreamClient {
        EventStreamClient::new(&self.base_url, &TransportConfig::default(), fast_retry())
            .expect("event client")
    }

    pub fn orchestrator(&self, config: OrchestratorConfig) -> SessionOrchestrator {
        SessionOrchestrator::new(self.client(), Arc::new(self.events()), config)
    }

    /// JSON reply for `method path`.
    pub async fn mock_json(&mut self, method: &str, path: &str, status: usize, body: &str) -> Mock {
        self.server
            .mock(method, path)
            .match_query(Matcher::Any)
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await
    }

    /// Event-stream reply built from raw SSE blocks; each block gets its blank-line terminator.
    pub async fn mock_sse(&mut self, method: &str, path: &str, blocks: &[&str]) -> Mock {
        let body: String = blocks.iter().map(|b| format!("{b}\n\n")).collect();
        self.server
            .mock(method, path)
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await
    }

    /// A bare status reply, `expect`ed exactly `times` times.
    pub async fn mock_status(&mut self, method: &str, path: &str, status: usize, times: usize) -> Mock {
        self.server
            .mock(method, path)
            .with_status(status)
            .with_body(format!("{{\"error\":\"status {status}\"}}"))
            .expect(times)
            .create_async()
            .await
    }
}

pub fn session_json(id: &str, title: &str) -> String {
    format!(r#"{{"id":"{id}","title":"{title}","createdAt":1718000000000}}"#)
}

pub fn message_json(id: &str, session_id: &str, text: &str) -> String {
    format!(
        r#"{{"info":{{"id":"{id}","sessionID":"{session_id}","role":"assistant"}},"parts":[{{"type":"text","text":"{text}"}}]}}"#
    )
}
