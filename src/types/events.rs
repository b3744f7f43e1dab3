//! Streaming events decoded from the backend's SSE endpoints.

use serde::{Deserialize, Serialize};

/// One decoded server-sent event.
///
/// Events are transient: they are handed to the consumer in arrival order and
/// never kept as standing state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum StreamEvent {
    /// Assistant message started.
    MessageStart { message_id: String },

    /// Incremental text.
    TextDelta { text: String },

    /// The assistant invoked a tool. `input` is the raw JSON of the arguments.
    ToolUse { name: String, input: String },

    /// A tool finished. `result` is the raw JSON of the output.
    ToolResult { name: String, result: String },

    /// Assistant message finished.
    MessageComplete { message_id: String },

    /// Keepalive (SSE comment line or explicit ping).
    Heartbeat,

    /// Server-reported or connection-level failure. Always the last event of a failed stream.
    Error { message: String },
}

impl StreamEvent {
    pub fn text_delta(text: impl Into<String>) -> Self {
        StreamEvent::TextDelta { text: text.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        StreamEvent::Error {
            message: message.into(),
        }
    }

    /// Whether the event ends the current assistant message.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamEvent::MessageComplete { .. } | StreamEvent::Error { .. }
        )
    }

    pub fn is_heartbeat(&self) -> bool {
        matches!(self, StreamEvent::Heartbeat)
    }
}
