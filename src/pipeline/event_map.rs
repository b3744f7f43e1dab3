//! Event mapping (SSE frame -> StreamEvent)
//!
//! The frame's `event:` label selects the event kind; without a label the
//! JSON `type` field is used. Matching is case-insensitive:
//!
//! | Type strings | Event |
//! |--------------|-------|
//! | `message_start`, `message.start` | `MessageStart` |
//! | `content_block_delta`, `text_delta`, `delta`, `text` | `TextDelta` |
//! | `tool_use`, `tool.use` | `ToolUse` |
//! | `tool_result`, `tool.result` | `ToolResult` |
//! | `message_stop`, `message.complete`, `message_complete` | `MessageComplete` |
//! | `error` | `Error` |
//! | `ping`, `heartbeat` | `Heartbeat` |
//!
//! Anything else is dropped without error.

use crate::pipeline::decode::{SseFrame, SseRecord};
use crate::types::StreamEvent;
use serde_json::{Map, Value};
use tracing::debug;

/// Event kind selected by a frame's type string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    MessageStart,
    TextDelta,
    ToolUse,
    ToolResult,
    MessageComplete,
    Error,
    Heartbeat,
}

impl EventKind {
    pub fn from_type(raw: &str) -> Option<Self> {
        let kind = match raw.trim().to_ascii_lowercase().as_str() {
            "message_start" | "message.start" => Self::MessageStart,
            "content_block_delta" | "text_delta" | "delta" | "text" => Self::TextDelta,
            "tool_use" | "tool.use" => Self::ToolUse,
            "tool_result" | "tool.result" => Self::ToolResult,
            "message_stop" | "message.complete" | "message_complete" => Self::MessageComplete,
            "error" => Self::Error,
            "ping" | "heartbeat" => Self::Heartbeat,
            _ => return None,
        };
        Some(kind)
    }
}

/// Map one framing record. Comments are heartbeats.
pub fn map_record(record: &SseRecord) -> Option<StreamEvent> {
    match record {
        SseRecord::Comment(_) => Some(StreamEvent::Heartbeat),
        SseRecord::Frame(frame) => map_frame(frame),
    }
}

/// Map one frame; `None` for malformed or unrecognized frames.
pub fn map_frame(frame: &SseFrame) -> Option<StreamEvent> {
    let obj = match serde_json::from_str::<Value>(&frame.data) {
        Ok(Value::Object(obj)) => obj,
        Ok(_) => {
            debug!(event = ?frame.event, "skipping non-object frame");
            return None;
        }
        Err(e) => {
            debug!(event = ?frame.event, error = %e, "skipping malformed frame");
            return None;
        }
    };

    let type_str = match frame.event.as_deref() {
        Some(label) => label,
        None => match obj.get("type").and_then(Value::as_str) {
            Some(t) => t,
            None => {
                debug!("skipping frame without a type");
                return None;
            }
        },
    };

    let Some(kind) = EventKind::from_type(type_str) else {
        debug!(event_type = type_str, "dropping unrecognized event");
        return None;
    };
    build_event(kind, &obj)
}

fn build_event(kind: EventKind, obj: &Map<String, Value>) -> Option<StreamEvent> {
    let event = match kind {
        EventKind::MessageStart => StreamEvent::MessageStart {
            message_id: message_id(obj),
        },
        EventKind::TextDelta => {
            let text = str_field(obj, "text")
                .or_else(|| obj.get("delta").and_then(|d| d.get("text")).and_then(Value::as_str))
                .or_else(|| str_field(obj, "content"))
                .unwrap_or_default();
            if text.is_empty() {
                return None;
            }
            StreamEvent::TextDelta {
                text: text.to_string(),
            }
        }
        EventKind::ToolUse => StreamEvent::ToolUse {
            name: str_field(obj, "name").unwrap_or_default().to_string(),
            input: json_field(obj, "input"),
        },
        EventKind::ToolResult => StreamEvent::ToolResult {
            name: str_field(obj, "name").unwrap_or_default().to_string(),
            result: json_field(obj, "result"),
        },
        EventKind::MessageComplete => StreamEvent::MessageComplete {
            message_id: message_id(obj),
        },
        EventKind::Error => StreamEvent::Error {
            message: str_field(obj, "message")
                .or_else(|| str_field(obj, "error"))
                .unwrap_or("Unknown error")
                .to_string(),
        },
        EventKind::Heartbeat => StreamEvent::Heartbeat,
    };
    Some(event)
}

fn str_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str)
}

fn message_id(obj: &Map<String, Value>) -> String {
    str_field(obj, "message_id")
        .or_else(|| str_field(obj, "id"))
        .unwrap_or_default()
        .to_string()
}

/// Raw JSON text of a field, empty when absent.
fn json_field(obj: &Map<String, Value>, key: &str) -> String {
    obj.get(key).map(Value::to_string).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(event: Option<&str>, data: &str) -> SseFrame {
        SseFrame {
            event: event.map(str::to_string),
            data: data.to_string(),
        }
    }

    #[test]
    fn aliases_are_case_insensitive() {
        for t in ["message_start", "Message.Start"] {
            assert_eq!(EventKind::from_type(t), Some(EventKind::MessageStart));
        }
        for t in ["content_block_delta", "TEXT_DELTA", "delta", "text"] {
            assert_eq!(EventKind::from_type(t), Some(EventKind::TextDelta));
        }
        for t in ["message_stop", "message.complete", "Message_Complete"] {
            assert_eq!(EventKind::from_type(t), Some(EventKind::MessageComplete));
        }
        assert_eq!(EventKind::from_type("session.updated"), None);
    }

    #[test]
    fn text_fallback_order() {
        let e = map_frame(&frame(None, r#"{"type":"delta","delta":{"text":"a"},"content":"b"}"#));
        assert_eq!(e, Some(StreamEvent::text_delta("a")));
        let e = map_frame(&frame(None, r#"{"type":"text","content":"b"}"#));
        assert_eq!(e, Some(StreamEvent::text_delta("b")));
        let e = map_frame(&frame(None, r#"{"type":"text_delta","text":""}"#));
        assert_eq!(e, None);
    }

    #[test]
    fn event_label_wins_over_type_field() {
        let e = map_frame(&frame(Some("message_stop"), r#"{"type":"text","id":"m9"}"#));
        assert_eq!(
            e,
            Some(StreamEvent::MessageComplete {
                message_id: "m9".to_string()
            })
        );
    }

    #[test]
    fn message_id_prefers_message_id_field() {
        let e = map_frame(&frame(None, r#"{"type":"message_start","message_id":"a","id":"b"}"#));
        assert_eq!(
            e,
            Some(StreamEvent::MessageStart {
                message_id: "a".to_string()
            })
        );
    }

    #[test]
    fn tool_payloads_are_kept_as_json_text() {
        let e = map_frame(&frame(
            Some("tool.use"),
            r#"{"name":"read","input":{"path":"a.rs"}}"#,
        ));
        assert_eq!(
            e,
            Some(StreamEvent::ToolUse {
                name: "read".to_string(),
                input: r#"{"path":"a.rs"}"#.to_string()
            })
        );
        let e = map_frame(&frame(Some("tool_result"), r#"{"name":"read","result":"ok"}"#));
        assert_eq!(
            e,
            Some(StreamEvent::ToolResult {
                name: "read".to_string(),
                result: "\"ok\"".to_string()
            })
        );
    }

    #[test]
    fn error_message_fallbacks() {
        let e = map_frame(&frame(None, r#"{"type":"error","error":"overloaded"}"#));
        assert_eq!(e, Some(StreamEvent::error("overloaded")));
        let e = map_frame(&frame(Some("error"), "{}"));
        assert_eq!(e, Some(StreamEvent::error("Unknown error")));
    }

    #[test]
    fn malformed_and_untyped_frames_are_dropped() {
        assert_eq!(map_frame(&frame(None, "{not json")), None);
        assert_eq!(map_frame(&frame(None, "[1,2]")), None);
        assert_eq!(map_frame(&frame(None, r#"{"text":"no type"}"#)), None);
    }

    #[test]
    fn comments_and_pings_are_heartbeats() {
        assert_eq!(
            map_record(&SseRecord::Comment(String::new())),
            Some(StreamEvent::Heartbeat)
        );
        assert_eq!(
            map_frame(&frame(Some("ping"), "{}")),
            Some(StreamEvent::Heartbeat)
        );
    }
}
