//! 会话编排：创建或复用会话，发送提示，必要时回退到非流式请求。
//!
//! # Session orchestration
//!
//! [`SessionOrchestrator`] is what a UI layer talks to. It keeps one current
//! session (created lazily on the first prompt) and sends prompts through the
//! streaming endpoint when enabled, falling back to the plain request when the
//! stream fails before delivering anything.

mod reply;

pub use reply::{PromptReply, PromptStream, StreamedReply, ToolActivity};

use crate::client::OpencodeClient;
use crate::error::require_non_empty;
use crate::stream::{Delivery, EventStreamClient};
use crate::supervisor::BackendConnection;
use crate::types::{
    CreateSessionRequest, MessagePart, MessageResponse, ModelRef, PromptRequest, Session,
    StreamEvent,
};
use crate::{Error, Result};
use arc_swap::ArcSwapOption;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Prompt defaults.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub prefer_streaming: bool,
    /// Title of sessions created implicitly by a prompt.
    pub default_title: Option<String>,
    pub model: Option<ModelRef>,
    pub agent: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            prefer_streaming: true,
            default_title: None,
            model: None,
            agent: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn streaming(mut self, prefer: bool) -> Self {
        self.prefer_streaming = prefer;
        self
    }

    pub fn with_default_title(mut self, title: impl Into<String>) -> Self {
        self.default_title = Some(title.into());
        self
    }

    pub fn with_model(mut self, model: ModelRef) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }
}

pub struct SessionOrchestrator {
    client: OpencodeClient,
    events: Arc<EventStreamClient>,
    config: OrchestratorConfig,
    current: ArcSwapOption<Session>,
}

impl SessionOrchestrator {
    pub fn new(
        client: OpencodeClient,
        events: Arc<EventStreamClient>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            client,
            events,
            config,
            current: ArcSwapOption::empty(),
        }
    }

    /// Orchestrator over the clients of a running backend.
    pub fn from_connection(connection: &BackendConnection, config: OrchestratorConfig) -> Self {
        Self::new(connection.client.clone(), connection.events.clone(), config)
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn client(&self) -> &OpencodeClient {
        &self.client
    }

    pub fn events(&self) -> &Arc<EventStreamClient> {
        &self.events
    }

    pub fn current_session(&self) -> Option<Arc<Session>> {
        self.current.load_full()
    }

    /// Replace the cached current session. Last call wins.
    pub fn set_current_session(&self, session: Option<Session>) {
        self.current.store(session.map(Arc::new));
    }

    /// Create a session and make it current.
    pub async fn create_session(&self, title: Option<&str>) -> Result<Session> {
        let mut request = CreateSessionRequest::new();
        if let Some(title) = title.or(self.config.default_title.as_deref()) {
            request = request.with_title(title);
        }
        let session = self.client.create_session(&request).await?;
        self.current.store(Some(Arc::new(session.clone())));
        Ok(session)
    }

    pub async fn list_sessions(&self) -> Result<Vec<Session>> {
        self.client.list_sessions().await
    }

    /// Messages of the current session; empty when there is none.
    pub async fn messages(&self, limit: Option<u32>) -> Result<Vec<MessageResponse>> {
        match self.current_session() {
            Some(session) => self.client.list_messages(&session.id, limit).await,
            None => Ok(Vec::new()),
        }
    }

    /// Delete a session. Drops the cache and any live stream when it was current.
    pub async fn delete_session(&self, session_id: &str) -> Result<bool> {
        let deleted = self.client.delete_session(session_id).await?;
        self.events.cancel(session_id);
        if deleted {
            self.current.rcu(|cur| match cur {
                Some(s) if s.id == session_id => None,
                other => other.clone(),
            });
        }
        Ok(deleted)
    }

    /// Ask the server to stop generating in `session_id`.
    ///
    /// Best effort: a live stream may still yield a few events, so callers
    /// should also cancel their [`PromptStream`].
    pub async fn abort(&self, session_id: &str) -> Result<bool> {
        self.client.abort_session(session_id).await
    }

    /// [`abort`](Self::abort) for the current session; `false` when there is none.
    pub async fn abort_current(&self) -> Result<bool> {
        match self.current_session() {
            Some(session) => self.abort(&session.id).await,
            None => Ok(false),
        }
    }

    /// Send a text prompt to the current session, creating one first if needed.
    pub async fn send_prompt(&self, text: &str) -> Result<PromptReply> {
        require_non_empty(text, "text", "session_orchestrator")?;
        self.send_parts(vec![MessagePart::text(text)]).await
    }

    /// Like [`send_prompt`](Self::send_prompt) with explicit parts (text and file references).
    pub async fn send_parts(&self, parts: Vec<MessagePart>) -> Result<PromptReply> {
        crate::client::sessions::validate_parts(&parts)?;
        let session = self.ensure_session().await?;
        let request = PromptRequest::with_parts(parts)
            .model(self.config.model.clone())
            .agent(self.config.agent.clone());

        if self.config.prefer_streaming {
            if let Some(stream) = self.try_stream(&session.id, &request).await? {
                return Ok(PromptReply::Streaming(stream));
            }
        }

        let response = self.client.send_prompt(&session.id, &request).await?;
        Ok(PromptReply::Complete(response))
    }

    async fn ensure_session(&self) -> Result<Arc<Session>> {
        if let Some(session) = self.current_session() {
            return Ok(session);
        }
        self.create_session(None)
            .await
            .map(Arc::new)
            .map_err(|e| {
                warn!(error = %e, "could not create a session for the prompt");
                Error::SessionCreationFailed {
                    source: Box::new(e),
                }
            })
    }

    /// Open the prompt stream and wait for its first non-heartbeat event.
    ///
    /// `None` means the stream failed on this side (connect or I/O) or ended
    /// before delivering anything, and the caller should use the plain request
    /// instead. A server `error` frame is a delivered event and is passed on.
    async fn try_stream(
        &self,
        session_id: &str,
        request: &PromptRequest,
    ) -> Result<Option<PromptStream>> {
        let mut subscription = self.events.stream_prompt(session_id, request)?;
        let mut prefix = VecDeque::new();
        loop {
            match subscription.next_delivery().await {
                Some(Delivery::Event(StreamEvent::Heartbeat)) => {
                    prefix.push_back(StreamEvent::Heartbeat)
                }
                Some(Delivery::Event(event)) => {
                    debug!(session_id, "prompt stream delivering");
                    prefix.push_back(event);
                    return Ok(Some(PromptStream::new(prefix, subscription)));
                }
                Some(Delivery::Failure(message)) => {
                    warn!(session_id, error = %message, "stream failed before any event, falling back");
                    return Ok(None);
                }
                None => {
                    warn!(session_id, "stream ended before any event, falling back");
                    return Ok(None);
                }
            }
        }
    }
}

impl std::fmt::Debug for SessionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOrchestrator")
            .field("base_url", &self.client.base_url().as_str())
            .field("current", &self.current_session().map(|s| s.id.clone()))
            .field("config", &self.config)
            .finish()
    }
}
