//! 流式事件客户端：每个会话一个解码循环，支持取消。
//!
//! # Event stream client
//!
//! Two stream shapes share one decode loop:
//!
//! - [`EventStreamClient::subscribe_to_events`]: `GET /session/{id}/events`
//! - [`EventStreamClient::stream_prompt`]: `POST /session/{id}/message/stream`
//!
//! Each stream runs in its own task and hands events to the consumer over a
//! bounded channel. Connection failures (after retries) and mid-stream I/O
//! failures are delivered as one final [`StreamEvent::Error`], never as a
//! returned error. At most one stream per session is live: opening a new one
//! cancels the previous.

mod subscription;

pub use subscription::{EventSubscription, StreamState};
pub(crate) use subscription::Delivery;

use crate::error::require_non_empty;
use crate::pipeline::decode_events;
use crate::resilience::{BackoffRetrier, RetryPolicy};
use crate::transport::{HttpTransport, TransportConfig, TransportError};
use crate::types::{PromptRequest, StreamEvent};
use crate::{Error, Result};
use futures::StreamExt;
use reqwest::Method;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

const DEFAULT_CHANNEL_CAPACITY: usize = 64;
const SOURCE: &str = "event_stream";

struct ActiveStream {
    generation: u64,
    token: CancellationToken,
}

type Registry = Arc<Mutex<HashMap<String, ActiveStream>>>;

/// When a stream ends on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndPolicy {
    /// Prompt streams carry one reply; stop at `MessageComplete`.
    AfterMessage,
    /// Subscriptions span many messages; run until the server closes.
    UntilClosed,
}

/// Streaming counterpart of [`OpencodeClient`](crate::client::OpencodeClient).
pub struct EventStreamClient {
    transport: Arc<HttpTransport>,
    retrier: BackoffRetrier,
    root: Mutex<CancellationToken>,
    registry: Registry,
    generation: AtomicU64,
    channel_capacity: usize,
}

impl EventStreamClient {
    /// Client for `base_url`. The transport gets no total timeout; streams may run indefinitely.
    pub fn new(base_url: &str, config: &TransportConfig, retry: RetryPolicy) -> Result<Self> {
        let transport = HttpTransport::new(base_url, &config.for_streaming())?;
        Ok(Self {
            transport: Arc::new(transport),
            retrier: BackoffRetrier::new(retry),
            root: Mutex::new(CancellationToken::new()),
            registry: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        })
    }

    /// Bound of the per-stream event buffer. A slow consumer backpressures the reader.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    pub fn base_url(&self) -> &Url {
        self.transport.base_url()
    }

    /// Live event feed of a session.
    pub fn subscribe_to_events(&self, session_id: &str) -> Result<EventSubscription> {
        require_non_empty(session_id, "session_id", SOURCE)?;
        let url = self.transport.url(&["session", session_id, "events"])?;
        self.open(session_id, Method::GET, url, None, EndPolicy::UntilClosed)
    }

    /// Send a prompt and decode the reply as it is generated.
    pub fn stream_prompt(
        &self,
        session_id: &str,
        request: &PromptRequest,
    ) -> Result<EventSubscription> {
        require_non_empty(session_id, "session_id", SOURCE)?;
        crate::client::sessions::validate_parts(&request.parts)?;
        let url = self
            .transport
            .url(&["session", session_id, "message", "stream"])?;
        let body = serde_json::to_value(request.stream_body())?;
        self.open(session_id, Method::POST, url, Some(body), EndPolicy::AfterMessage)
    }

    /// [`stream_prompt`](Self::stream_prompt) with a single text part.
    pub fn stream_text(&self, session_id: &str, text: &str) -> Result<EventSubscription> {
        self.stream_prompt(session_id, &PromptRequest::text(text))
    }

    /// Cancel the live stream of `session_id`, if any.
    pub fn cancel(&self, session_id: &str) -> bool {
        match lock(&self.registry).remove(session_id) {
            Some(active) => {
                active.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_streaming(&self, session_id: &str) -> bool {
        lock(&self.registry).contains_key(session_id)
    }

    pub fn active_streams(&self) -> usize {
        lock(&self.registry).len()
    }

    /// Cancel every open stream. The client stays usable.
    pub fn close_all(&self) {
        let old = std::mem::replace(&mut *lock(&self.root), CancellationToken::new());
        old.cancel();
        lock(&self.registry).clear();
        debug!("closed all event streams");
    }

    fn open(
        &self,
        session_id: &str,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
        end: EndPolicy,
    ) -> Result<EventSubscription> {
        let token = lock(&self.root).child_token();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);

        let previous = lock(&self.registry).insert(
            session_id.to_string(),
            ActiveStream {
                generation,
                token: token.clone(),
            },
        );
        if let Some(prev) = previous {
            debug!(session_id, "replacing live stream");
            prev.token.cancel();
        }

        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let (state_tx, state_rx) = watch::channel(StreamState::Idle);

        let task = StreamTask {
            session_id: session_id.to_string(),
            generation,
            transport: self.transport.clone(),
            retrier: self.retrier.clone(),
            registry: self.registry.clone(),
            method,
            url,
            body,
            end,
            token: token.clone(),
            tx,
            state: state_tx,
        };
        tokio::spawn(task.run());

        Ok(EventSubscription::new(
            session_id.to_string(),
            rx,
            state_rx,
            token,
        ))
    }
}

impl Drop for EventStreamClient {
    fn drop(&mut self) {
        lock(&self.root).cancel();
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    // Critical sections never panic; recover the data if one somehow did.
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct StreamTask {
    session_id: String,
    generation: u64,
    transport: Arc<HttpTransport>,
    retrier: BackoffRetrier,
    registry: Registry,
    method: Method,
    url: Url,
    body: Option<serde_json::Value>,
    end: EndPolicy,
    token: CancellationToken,
    tx: mpsc::Sender<Delivery>,
    state: watch::Sender<StreamState>,
}

impl StreamTask {
    async fn run(self) {
        let final_state = self.drive().await;
        self.state.send_replace(final_state);

        let mut registry = lock(&self.registry);
        if registry
            .get(&self.session_id)
            .map_or(false, |a| a.generation == self.generation)
        {
            registry.remove(&self.session_id);
        }
    }

    async fn drive(&self) -> StreamState {
        let session_id = self.session_id.as_str();
        self.state.send_replace(StreamState::Connecting);

        let connect = self.retrier.retry_classified(|_| {
            let mut request = self
                .transport
                .stream_request(self.method.clone(), self.url.clone());
            if let Some(body) = &self.body {
                request = request.json(body);
            }
            self.transport.dispatch(request)
        });
        let response = tokio::select! {
            _ = self.token.cancelled() => return StreamState::Cancelled,
            r = connect => r,
        };
        let response = match response {
            Ok(r) => r,
            Err(err) => {
                let decision = err.retry_decision();
                warn!(
                    session_id,
                    category = decision.category.name(),
                    error = %err,
                    "event stream failed to connect"
                );
                self.deliver_error(decision.user_message).await;
                return StreamState::Failed;
            }
        };

        self.state.send_replace(StreamState::Streaming);
        info!(session_id, status = response.status().as_u16(), "event stream opened");

        let mut events = Box::pin(decode_events(response.bytes_stream()));
        loop {
            let next = tokio::select! {
                biased;
                _ = self.token.cancelled() => {
                    debug!(session_id, "event stream cancelled");
                    return StreamState::Cancelled;
                }
                next = events.next() => next,
            };

            match next {
                Some(Ok(event)) => {
                    if event.is_heartbeat() {
                        debug!(session_id, "heartbeat");
                    }
                    let complete = matches!(event, StreamEvent::MessageComplete { .. });
                    if !self.deliver(Delivery::Event(event)).await {
                        return StreamState::Cancelled;
                    }
                    if complete && self.end == EndPolicy::AfterMessage {
                        info!(session_id, "event stream completed");
                        return StreamState::Completed;
                    }
                }
                Some(Err(e)) => {
                    let err = Error::stream("stream interrupted", Some(TransportError::Http(e)));
                    warn!(session_id, error = %err, "event stream failed");
                    let message = err.user_message();
                    self.deliver_error(message).await;
                    return StreamState::Failed;
                }
                None => {
                    info!(session_id, "event stream closed by server");
                    return StreamState::Completed;
                }
            }
        }
    }

    /// `false` when the stream was cancelled or the consumer went away.
    async fn deliver(&self, item: Delivery) -> bool {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => false,
            sent = self.tx.send(item) => sent.is_ok(),
        }
    }

    async fn deliver_error(&self, message: String) {
        self.deliver(Delivery::Failure(message)).await;
    }
}
