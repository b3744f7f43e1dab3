use crate::stream::{EventSubscription, StreamState};
use crate::types::{MessageResponse, StreamEvent};
use futures::{Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Outcome of [`SessionOrchestrator::send_prompt`](super::SessionOrchestrator::send_prompt).
#[derive(Debug)]
pub enum PromptReply {
    /// The reply is being generated; consume the events as they arrive.
    Streaming(PromptStream),
    /// The reply came back whole (streaming disabled or fell back).
    Complete(MessageResponse),
}

impl PromptReply {
    pub fn is_streaming(&self) -> bool {
        matches!(self, PromptReply::Streaming(_))
    }

    /// Wait for the whole reply, whichever path produced it.
    pub async fn collect(self) -> StreamedReply {
        match self {
            PromptReply::Streaming(stream) => stream.collect_reply().await,
            PromptReply::Complete(response) => StreamedReply {
                message_id: Some(response.info.id.clone()),
                text: response.text(),
                completed: true,
                ..StreamedReply::default()
            },
        }
    }
}

/// Tool activity seen in a streamed reply. Payloads are raw JSON text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolActivity {
    pub name: String,
    pub payload: String,
}

/// A streamed reply folded into one value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamedReply {
    pub message_id: Option<String>,
    pub text: String,
    pub tool_uses: Vec<ToolActivity>,
    pub tool_results: Vec<ToolActivity>,
    /// `MessageComplete` arrived, or the stream ended cleanly with the text so far.
    pub completed: bool,
    /// Set when the stream ended with an `Error` event. `text` keeps what arrived before it.
    pub error: Option<String>,
}

/// Events of one prompt, starting with those read while deciding on fallback.
pub struct PromptStream {
    prefix: VecDeque<StreamEvent>,
    subscription: EventSubscription,
}

impl PromptStream {
    pub(crate) fn new(prefix: VecDeque<StreamEvent>, subscription: EventSubscription) -> Self {
        Self {
            prefix,
            subscription,
        }
    }

    pub fn session_id(&self) -> &str {
        self.subscription.session_id()
    }

    pub fn state(&self) -> StreamState {
        self.subscription.state()
    }

    /// Stop reading and close the connection. Does not abort generation server-side.
    pub fn cancel(&mut self) {
        self.prefix.clear();
        self.subscription.cancel();
    }

    pub async fn collect_reply(mut self) -> StreamedReply {
        let mut reply = StreamedReply::default();
        while let Some(event) = self.next().await {
            match event {
                StreamEvent::MessageStart { message_id } => {
                    if !message_id.is_empty() {
                        reply.message_id = Some(message_id);
                    }
                }
                StreamEvent::TextDelta { text } => reply.text.push_str(&text),
                StreamEvent::ToolUse { name, input } => reply.tool_uses.push(ToolActivity {
                    name,
                    payload: input,
                }),
                StreamEvent::ToolResult { name, result } => {
                    reply.tool_results.push(ToolActivity {
                        name,
                        payload: result,
                    })
                }
                StreamEvent::MessageComplete { message_id } => {
                    if !message_id.is_empty() {
                        reply.message_id = Some(message_id);
                    }
                    reply.completed = true;
                    return reply;
                }
                StreamEvent::Error { message } => {
                    reply.error = Some(message);
                    return reply;
                }
                StreamEvent::Heartbeat => {}
            }
        }
        // Clean end without MessageComplete: what arrived is the reply.
        reply.completed = !self.subscription.is_cancelled();
        reply
    }
}

impl Stream for PromptStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(event) = self.prefix.pop_front() {
            return Poll::Ready(Some(event));
        }
        Pin::new(&mut self.subscription).poll_next(cx)
    }
}

impl std::fmt::Debug for PromptStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptStream")
            .field("buffered", &self.prefix.len())
            .field("subscription", &self.subscription)
            .finish()
    }
}
