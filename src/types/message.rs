//! Messages, message parts and prompt bodies.

use serde::{Deserialize, Serialize};

use super::session::Timestamp;

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    /// A role this client does not know about yet.
    #[serde(other)]
    Unknown,
}

/// Message metadata. Owned by its session and never mutated client-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(rename = "sessionID")]
    pub session_id: String,
    pub role: MessageRole,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
}

/// Part type tag. Unrecognized tags are preserved verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PartKind {
    Text,
    File,
    Other(String),
}

impl From<String> for PartKind {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "text" => PartKind::Text,
            "file" => PartKind::File,
            _ => PartKind::Other(raw),
        }
    }
}

impl From<PartKind> for String {
    fn from(kind: PartKind) -> Self {
        match kind {
            PartKind::Text => "text".to_string(),
            PartKind::File => "file".to_string(),
            PartKind::Other(raw) => raw,
        }
    }
}

/// One ordered piece of a prompt or reply. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePart {
    #[serde(rename = "type")]
    pub kind: PartKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl MessagePart {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: PartKind::Text,
            text: Some(text.into()),
            path: None,
        }
    }

    /// Reference to a project file, resolved by the backend.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            kind: PartKind::File,
            text: None,
            path: Some(path.into()),
        }
    }

    pub fn is_text(&self) -> bool {
        self.kind == PartKind::Text
    }
}

/// A message together with its parts, in server order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub info: Message,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

impl MessageResponse {
    /// Text parts joined by newlines; non-text parts are skipped.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter(|p| p.is_text())
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Model selection attached to a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRef {
    #[serde(rename = "providerID")]
    pub provider_id: String,
    #[serde(rename = "modelID")]
    pub model_id: String,
}

impl ModelRef {
    pub fn new(provider_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            model_id: model_id.into(),
        }
    }
}

/// Body of `POST /session/{id}/message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptRequest {
    pub parts: Vec<MessagePart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(rename = "messageID", default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(rename = "noReply", default)]
    pub no_reply: bool,
}

impl PromptRequest {
    pub fn text(text: impl Into<String>) -> Self {
        Self::with_parts(vec![MessagePart::text(text)])
    }

    pub fn with_parts(parts: Vec<MessagePart>) -> Self {
        Self {
            parts,
            model: None,
            agent: None,
            message_id: None,
            no_reply: false,
        }
    }

    pub fn model(mut self, model: Option<ModelRef>) -> Self {
        self.model = model;
        self
    }

    pub fn agent(mut self, agent: Option<String>) -> Self {
        self.agent = agent;
        self
    }

    pub fn message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn no_reply(mut self, no_reply: bool) -> Self {
        self.no_reply = no_reply;
        self
    }

    /// Body for the streaming endpoint: the same shape without `noReply`.
    pub(crate) fn stream_body(&self) -> StreamPromptBody<'_> {
        StreamPromptBody {
            parts: &self.parts,
            model: self.model.as_ref(),
            agent: self.agent.as_deref(),
            message_id: self.message_id.as_deref(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct StreamPromptBody<'a> {
    pub parts: &'a [MessagePart],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<&'a ModelRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<&'a str>,
    #[serde(rename = "messageID", skip_serializing_if = "Option::is_none")]
    pub message_id: Option<&'a str>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prompt_request_wire_shape() {
        let req = PromptRequest::text("hello")
            .model(Some(ModelRef::new("anthropic", "claude")))
            .agent(Some("build".to_string()));
        let body = serde_json::to_value(&req).unwrap();
        assert_eq!(
            body,
            json!({
                "parts": [{"type": "text", "text": "hello"}],
                "model": {"providerID": "anthropic", "modelID": "claude"},
                "agent": "build",
                "noReply": false
            })
        );
    }

    #[test]
    fn stream_body_drops_no_reply() {
        let req = PromptRequest::text("hi").no_reply(true).message_id("m1");
        let body = serde_json::to_value(req.stream_body()).unwrap();
        assert_eq!(
            body,
            json!({"parts": [{"type": "text", "text": "hi"}], "messageID": "m1"})
        );
    }

    #[test]
    fn part_kind_keeps_unknown_tags() {
        let part: MessagePart =
            serde_json::from_str(r#"{"type":"step-start","extra":1}"#).unwrap();
        assert_eq!(part.kind, PartKind::Other("step-start".to_string()));
        let back = serde_json::to_value(&part).unwrap();
        assert_eq!(back, json!({"type": "step-start"}));
    }

    #[test]
    fn echoed_parts_preserve_prompt_text() {
        let req = PromptRequest::with_parts(vec![
            MessagePart::text("first"),
            MessagePart::file("src/main.rs"),
            MessagePart::text("second"),
        ]);
        let encoded = serde_json::to_string(&req).unwrap();
        let echoed = json!({
            "info": {"id": "m1", "sessionID": "s1", "role": "user"},
            "parts": serde_json::from_str::<serde_json::Value>(&encoded).unwrap()["parts"].clone(),
        });
        let decoded: MessageResponse = serde_json::from_value(echoed).unwrap();
        assert_eq!(decoded.parts, req.parts);
        assert_eq!(decoded.text(), "first\nsecond");
    }

    #[test]
    fn unknown_role_decodes() {
        let msg: Message =
            serde_json::from_str(r#"{"id":"m","sessionID":"s","role":"tool"}"#).unwrap();
        assert_eq!(msg.role, MessageRole::Unknown);
    }
}
