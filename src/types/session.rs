//! Session records.

use serde::{Deserialize, Serialize};

/// Server-assigned timestamp.
///
/// The backend has shipped both epoch milliseconds and ISO-8601 strings, so both
/// shapes are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Millis(i64),
    Text(String),
}

/// A server-side conversation context.
///
/// The client only ever holds a read-only cached copy; `id` never changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Parent session for sub-session hierarchies (a reference, not ownership).
    #[serde(rename = "parentID", default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
    #[serde(rename = "updatedAt", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share: Option<String>,
}

impl Session {
    /// Title for display, falling back to a short id prefix.
    pub fn display_title(&self) -> String {
        match &self.title {
            Some(title) if !title.trim().is_empty() => title.clone(),
            _ => self.id.chars().take(8).collect(),
        }
    }
}

/// Body of `POST /session`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "parentID", default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl CreateSessionRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ignores_unknown_fields_and_defaults_optionals() {
        let raw = r#"{"id":"ses_1","version":"0.3","time":{"created":1}}"#;
        let session: Session = serde_json::from_str(raw).unwrap();
        assert_eq!(session.id, "ses_1");
        assert!(session.title.is_none());
        assert!(session.parent_id.is_none());
        assert!(session.created_at.is_none());
    }

    #[test]
    fn session_accepts_both_timestamp_shapes() {
        let raw = r#"{"id":"a","parentID":"p","createdAt":1700000000000,"updatedAt":"2024-01-01T00:00:00Z"}"#;
        let session: Session = serde_json::from_str(raw).unwrap();
        assert_eq!(session.parent_id.as_deref(), Some("p"));
        assert_eq!(session.created_at, Some(Timestamp::Millis(1_700_000_000_000)));
        assert_eq!(
            session.updated_at,
            Some(Timestamp::Text("2024-01-01T00:00:00Z".to_string()))
        );
    }

    #[test]
    fn create_request_omits_absent_fields() {
        let body = serde_json::to_value(CreateSessionRequest::new()).unwrap();
        assert_eq!(body, serde_json::json!({}));

        let body = serde_json::to_value(CreateSessionRequest::new().with_parent("p1")).unwrap();
        assert_eq!(body, serde_json::json!({"parentID": "p1"}));
    }

    #[test]
    fn display_title_falls_back_to_id_prefix() {
        let session = Session {
            id: "ses_0123456789".to_string(),
            title: None,
            parent_id: None,
            created_at: None,
            updated_at: None,
            share: None,
        };
        assert_eq!(session.display_title(), "ses_0123");
    }
}
