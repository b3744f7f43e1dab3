//! REST client against a mock backend.

mod integration;

use integration::mock_server::{message_json, session_json, MockServerFixture};
use mockito::Matcher;
use opencode_runtime::types::CreateSessionRequest;
use opencode_runtime::{Error, FailureCategory, MessagePart, PromptRequest, RetryPolicy};

#[tokio::test]
async fn health_reports_version() {
    let mut fixture = MockServerFixture::new().await;
    let mock = fixture
        .mock_json("GET", "/global/health", 200, r#"{"healthy":true,"version":"0.5.1"}"#)
        .await;

    let health = fixture.client().health().await.unwrap();
    assert!(health.healthy);
    assert_eq!(health.version, "0.5.1");
    mock.assert_async().await;
}

#[tokio::test]
async fn create_session_sends_title() {
    let mut fixture = MockServerFixture::new().await;
    let mock = fixture
        .server
        .mock("POST", "/session")
        .match_body(Matcher::PartialJson(serde_json::json!({ "title": "Refactor" })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(session_json("ses_1", "Refactor"))
        .create_async()
        .await;

    let session = fixture
        .client()
        .create_session(&CreateSessionRequest::new().with_title("Refactor"))
        .await
        .unwrap();
    assert_eq!(session.id, "ses_1");
    assert_eq!(session.display_title(), "Refactor");
    mock.assert_async().await;
}

#[tokio::test]
async fn list_sessions_decodes_all_entries() {
    let mut fixture = MockServerFixture::new().await;
    let body = format!(
        "[{},{}]",
        session_json("ses_a", "First"),
        session_json("ses_b", "Second")
    );
    fixture.mock_json("GET", "/session", 200, &body).await;

    let sessions = fixture.client().list_sessions().await.unwrap();
    let ids: Vec<_> = sessions.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, ["ses_a", "ses_b"]);
}

#[tokio::test]
async fn list_messages_passes_limit() {
    let mut fixture = MockServerFixture::new().await;
    let mock = fixture
        .server
        .mock("GET", "/session/ses_1/message")
        .match_query(Matcher::UrlEncoded("limit".into(), "2".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(format!("[{}]", message_json("msg_1", "ses_1", "hello")))
        .create_async()
        .await;

    let messages = fixture
        .client()
        .list_messages("ses_1", Some(2))
        .await
        .unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].text(), "hello");
    mock.assert_async().await;
}

#[tokio::test]
async fn send_prompt_posts_parts_in_order() {
    let mut fixture = MockServerFixture::new().await;
    let mock = fixture
        .server
        .mock("POST", "/session/ses_1/message")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "parts": [
                { "type": "text", "text": "explain" },
                { "type": "file", "path": "src/lib.rs" }
            ]
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(message_json("msg_2", "ses_1", "It is a library."))
        .create_async()
        .await;

    let request = PromptRequest::with_parts(vec![
        MessagePart::text("explain"),
        MessagePart::file("src/lib.rs"),
    ]);
    let reply = fixture
        .client()
        .send_prompt("ses_1", &request)
        .await
        .unwrap();
    assert_eq!(reply.info.id, "msg_2");
    assert_eq!(reply.text(), "It is a library.");
    mock.assert_async().await;
}

#[tokio::test]
async fn delete_and_abort_report_acceptance() {
    let mut fixture = MockServerFixture::new().await;
    fixture.mock_json("DELETE", "/session/ses_1", 200, "true").await;
    fixture
        .mock_json("POST", "/session/ses_1/abort", 200, "true")
        .await;

    let client = fixture.client();
    assert!(client.delete_session("ses_1").await.unwrap());
    assert!(client.abort_session("ses_1").await.unwrap());
}

#[tokio::test]
async fn find_files_encodes_query() {
    let mut fixture = MockServerFixture::new().await;
    let mock = fixture
        .server
        .mock("GET", "/find/file")
        .match_query(Matcher::UrlEncoded("query".into(), "main rs".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"["src/main.rs"]"#)
        .create_async()
        .await;

    let files = fixture.client().find_files("main rs").await.unwrap();
    assert_eq!(files, ["src/main.rs"]);
    mock.assert_async().await;
}

#[tokio::test]
async fn server_errors_are_retried_until_success() {
    let mut fixture = MockServerFixture::new().await;
    let failing = fixture.mock_status("GET", "/session/ses_1", 503, 2).await;
    let ok = fixture
        .mock_json("GET", "/session/ses_1", 200, &session_json("ses_1", "Back"))
        .await;

    let session = fixture.client().get_session("ses_1").await.unwrap();
    assert_eq!(session.title.as_deref(), Some("Back"));
    failing.assert_async().await;
    ok.assert_async().await;
}

#[tokio::test]
async fn not_found_is_not_retried() {
    let mut fixture = MockServerFixture::new().await;
    let mock = fixture.mock_status("GET", "/session/missing", 404, 1).await;

    let err = fixture.client().get_session("missing").await.unwrap_err();
    let decision = err.retry_decision();
    assert!(!decision.retryable);
    assert_eq!(decision.category, FailureCategory::NotFound);
    mock.assert_async().await;
}

#[tokio::test]
async fn rate_limit_honours_retry_after_then_gives_up() {
    let mut fixture = MockServerFixture::new().await;
    let mock = fixture
        .server
        .mock("GET", "/session")
        .with_status(429)
        .with_header("retry-after", "0")
        .expect(2)
        .create_async()
        .await;

    let client = fixture.client_with(
        RetryPolicy::default()
            .with_max_attempts(2)
            .with_initial_delay(std::time::Duration::from_millis(5)),
    );
    let err = client.list_sessions().await.unwrap_err();
    assert!(matches!(err, Error::Remote { status: 429, .. }));
    assert!(err.retry_decision().retryable);
    mock.assert_async().await;
}

#[tokio::test]
async fn malformed_body_is_a_protocol_error() {
    let mut fixture = MockServerFixture::new().await;
    fixture
        .mock_json("GET", "/global/health", 200, "<html>not json</html>")
        .await;

    let err = fixture.client().health().await.unwrap_err();
    assert!(matches!(err, Error::Protocol { .. }));
    assert!(!err.retry_decision().retryable);
}

#[tokio::test]
async fn invalid_arguments_never_reach_the_server() {
    let fixture = MockServerFixture::new().await;
    let client = fixture.client();

    let err = client.get_session(" ").await.unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
    let err = client.list_messages("ses_1", Some(0)).await.unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
    let err = client
        .send_prompt("ses_1", &PromptRequest::with_parts(Vec::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
}
