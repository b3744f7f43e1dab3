//! Session and message endpoints.

use crate::client::core::OpencodeClient;
use crate::error::require_non_empty;
use crate::types::{
    CreateSessionRequest, MessagePart, MessageResponse, PromptRequest, Session,
};
use crate::{Error, ErrorContext, Result};
use reqwest::Method;
use tracing::info;

const SOURCE: &str = "transport_client";

impl OpencodeClient {
    /// `POST /session`
    pub async fn create_session(&self, request: &CreateSessionRequest) -> Result<Session> {
        let url = self.url(&["session"])?;
        let session: Session = self
            .execute_json("POST /session", |t| {
                t.request(Method::POST, url.clone()).json(request)
            })
            .await?;
        info!(session_id = %session.id, "session created");
        Ok(session)
    }

    /// `GET /session`
    pub async fn list_sessions(&self) -> Result<Vec<Session>> {
        let url = self.url(&["session"])?;
        self.execute_json("GET /session", |t| t.request(Method::GET, url.clone()))
            .await
    }

    /// `GET /session/{id}`
    pub async fn get_session(&self, session_id: &str) -> Result<Session> {
        require_non_empty(session_id, "session_id", SOURCE)?;
        let url = self.url(&["session", session_id])?;
        self.execute_json("GET /session/{id}", |t| t.request(Method::GET, url.clone()))
            .await
    }

    /// `DELETE /session/{id}`. `true` when the server accepted the deletion.
    pub async fn delete_session(&self, session_id: &str) -> Result<bool> {
        require_non_empty(session_id, "session_id", SOURCE)?;
        let url = self.url(&["session", session_id])?;
        self.execute_status("DELETE /session/{id}", |t| {
            t.request(Method::DELETE, url.clone())
        })
        .await
    }

    /// `GET /session/{id}/message?limit=`
    pub async fn list_messages(
        &self,
        session_id: &str,
        limit: Option<u32>,
    ) -> Result<Vec<MessageResponse>> {
        require_non_empty(session_id, "session_id", SOURCE)?;
        if limit == Some(0) {
            return Err(Error::validation_with_context(
                "limit must be positive",
                ErrorContext::new()
                    .with_field_path("limit")
                    .with_source(SOURCE),
            ));
        }
        let mut url = self.url(&["session", session_id, "message"])?;
        if let Some(limit) = limit {
            url.query_pairs_mut()
                .append_pair("limit", &limit.to_string());
        }
        self.execute_json("GET /session/{id}/message", |t| {
            t.request(Method::GET, url.clone())
        })
        .await
    }

    /// `POST /session/{id}/message`. Waits for the whole reply.
    pub async fn send_prompt(
        &self,
        session_id: &str,
        request: &PromptRequest,
    ) -> Result<MessageResponse> {
        require_non_empty(session_id, "session_id", SOURCE)?;
        validate_parts(&request.parts)?;
        let url = self.url(&["session", session_id, "message"])?;
        self.execute_json("POST /session/{id}/message", |t| {
            t.request(Method::POST, url.clone()).json(request)
        })
        .await
    }

    /// Convenience for a single text part.
    pub async fn send_text(&self, session_id: &str, text: &str) -> Result<MessageResponse> {
        self.send_prompt(session_id, &PromptRequest::text(text)).await
    }

    /// `POST /session/{id}/abort`. Best effort: in-flight streams may still emit a few events.
    pub async fn abort_session(&self, session_id: &str) -> Result<bool> {
        require_non_empty(session_id, "session_id", SOURCE)?;
        let url = self.url(&["session", session_id, "abort"])?;
        self.execute_status("POST /session/{id}/abort", |t| {
            t.request(Method::POST, url.clone())
        })
        .await
    }
}

/// A prompt needs at least one part, and text parts need text.
pub(crate) fn validate_parts(parts: &[MessagePart]) -> Result<()> {
    if parts.is_empty() {
        return Err(Error::validation_with_context(
            "prompt must contain at least one part",
            ErrorContext::new()
                .with_field_path("parts")
                .with_source(SOURCE),
        ));
    }
    for (i, part) in parts.iter().enumerate() {
        if part.is_text() && part.text.as_deref().map_or(true, |t| t.trim().is_empty()) {
            return Err(Error::validation_with_context(
                "text part must not be empty",
                ErrorContext::new()
                    .with_field_path(format!("parts[{}].text", i))
                    .with_source(SOURCE),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientConfig, OpencodeClientBuilder};
    use crate::resilience::RetryPolicy;

    fn offline_client() -> OpencodeClient {
        // Port 9 (discard) is never contacted: validation fails first.
        OpencodeClientBuilder::from_config(ClientConfig::default())
            .base_url("http://127.0.0.1:9")
            .retry_policy(RetryPolicy::none())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn empty_session_id_is_a_validation_error() {
        let client = offline_client();
        let err = client.get_session("").await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(!err.is_retryable());

        let err = client.abort_session("   ").await.unwrap_err();
        assert_eq!(
            err.context().and_then(|c| c.field_path.as_deref()),
            Some("session_id")
        );
    }

    #[tokio::test]
    async fn empty_prompt_is_rejected() {
        let client = offline_client();
        let err = client.send_text("s1", "").await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));

        let err = client
            .send_prompt("s1", &PromptRequest::with_parts(vec![]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("at least one part"));
    }

    #[test]
    fn file_parts_need_no_text() {
        assert!(validate_parts(&[MessagePart::file("src/main.rs")]).is_ok());
    }
}
