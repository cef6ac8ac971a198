//! End-to-end exchanges against a mock chat function

use std::time::Duration;

use genie_stream::{
    config::Config,
    messages::{Conversation, Role, SharedConversation, TurnSink, TurnStatus},
    services::{ChatClient, ChatOptions, StaticCredential},
    streaming::{ChatSurface, StreamControl},
    trust::ConfidenceLevel,
    GenieError,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn client(server: &MockServer, token: Option<&str>) -> ChatClient<StaticCredential> {
    let mut config = Config::default();
    config.global.supabase_url = server.uri();
    config.global.request_timeout_secs = 5;
    ChatClient::new(&config, StaticCredential::new(token.map(str::to_string))).unwrap()
}

fn event_stream(lines: &[&str]) -> ResponseTemplate {
    let mut body = String::new();
    for line in lines {
        body.push_str(line);
        body.push('\n');
    }
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body)
}

const METADATA: &str = r#"data: {"type":"trust_metadata","confidenceLevel":"high","dataSensitivity":"standard","isInference":false,"explanation":"Based on your profile","factors":["Business profile"]}"#;

#[tokio::test]
async fn test_streamed_reply_with_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/functions/v1/genie-chat"))
        .and(header("authorization", "Bearer tok-123"))
        .and(body_partial_json(json!({
            "messages": [{"role": "user", "content": "How do I fill Monday classes?"}],
            "mode": "daily_operator",
            "_hp_field": ""
        })))
        .respond_with(event_stream(&[
            ": keep-alive",
            METADATA,
            r#"data: {"choices":[{"delta":{"content":"Try an "}}]}"#,
            "",
            r#"data: {"choices":[{"delta":{"content":"early-bird offer."}}]}"#,
            "data: [DONE]",
        ]))
        .expect(1)
        .mount(&server)
        .await;

    let mut conversation = Conversation::new();
    let turn = client(&server, Some("tok-123"))
        .send(
            &mut conversation,
            "How do I fill Monday classes?",
            &ChatOptions::new(ChatSurface::Workspace),
            &StreamControl::default(),
        )
        .await
        .unwrap();

    assert_eq!(turn.text, "Try an early-bird offer.");
    assert!(turn.saw_terminal);
    assert_eq!(
        turn.metadata.as_ref().map(|m| m.confidence_level),
        Some(ConfidenceLevel::High)
    );

    assert_eq!(conversation.len(), 2);
    assert_eq!(conversation.turns()[0].role, Role::User);
    let reply = conversation.last().unwrap();
    assert_eq!(reply.content, "Try an early-bird offer.");
    assert_eq!(reply.status, TurnStatus::Complete);
    assert!(reply.metadata.is_some());
}

#[tokio::test]
async fn test_coach_surface_ignores_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/functions/v1/ai-coach-chat"))
        .and(body_partial_json(json!({"mode": "general"})))
        .respond_with(event_stream(&[
            METADATA,
            r#"data: {"choices":[{"delta":{"content":"Breathe."}}]}"#,
        ]))
        .expect(1)
        .mount(&server)
        .await;

    let mut conversation = Conversation::new();
    let turn = client(&server, Some("tok"))
        .send(
            &mut conversation,
            "hi",
            &ChatOptions::new(ChatSurface::Coach).with_mode("decision_support"),
            &StreamControl::default(),
        )
        .await
        .unwrap();

    assert_eq!(turn.text, "Breathe.");
    assert!(turn.metadata.is_none());
    assert!(!turn.saw_terminal);
}

#[tokio::test]
async fn test_unauthenticated_never_hits_network() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut conversation = Conversation::new();
    let err = client(&server, None)
        .send(
            &mut conversation,
            "Plan my week",
            &ChatOptions::default(),
            &StreamControl::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, GenieError::Unauthenticated(_)));
    assert!(conversation.is_empty());
}

#[tokio::test]
async fn test_rate_limit_maps_and_rolls_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(429)
                .set_body_json(json!({"error": "Rate limit exceeded. Try again shortly."})),
        )
        .mount(&server)
        .await;

    let mut conversation = Conversation::new();
    let err = client(&server, Some("tok"))
        .send(
            &mut conversation,
            "Plan my week",
            &ChatOptions::default(),
            &StreamControl::default(),
        )
        .await
        .unwrap_err();

    match err {
        GenieError::RateLimited(message) => {
            assert_eq!(message, "Rate limit exceeded. Try again shortly.");
        }
        other => panic!("Expected rate limit, got {other:?}"),
    }
    assert!(conversation.is_empty());
}

#[tokio::test]
async fn test_server_error_message_and_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/functions/v1/genie-chat"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "Model overloaded"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/functions/v1/ai-coach-chat"))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
        .mount(&server)
        .await;

    let client = client(&server, Some("tok"));
    let mut conversation = Conversation::new();

    let err = client
        .send(
            &mut conversation,
            "Plan my week",
            &ChatOptions::default(),
            &StreamControl::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GenieError::Api { status: 500, ref message } if message == "Model overloaded"
    ));

    let err = client
        .send(
            &mut conversation,
            "hello",
            &ChatOptions::new(ChatSurface::Coach),
            &StreamControl::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GenieError::Api { status: 502, ref message } if message == "Failed to get response"
    ));
    assert!(conversation.is_empty());
}

#[tokio::test]
async fn test_payment_required_and_forbidden() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/functions/v1/genie-chat"))
        .respond_with(ResponseTemplate::new(402).set_body_json(json!({"error": "Upgrade required"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/functions/v1/ai-coach-chat"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let client = client(&server, Some("tok"));
    let mut conversation = Conversation::new();

    let err = client
        .send(&mut conversation, "Plan my week", &ChatOptions::default(), &StreamControl::default())
        .await
        .unwrap_err();
    assert!(matches!(err, GenieError::PaymentRequired(_)));

    let err = client
        .send(
            &mut conversation,
            "hello",
            &ChatOptions::new(ChatSurface::Coach),
            &StreamControl::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GenieError::Unauthenticated(_)));
}

#[tokio::test]
async fn test_empty_stream_is_error_and_rolls_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(event_stream(&[
            ": keep-alive",
            METADATA,
            r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#,
            "data: [DONE]",
        ]))
        .mount(&server)
        .await;

    let mut conversation = Conversation::new();
    conversation.push_user_turn("earlier question");
    let earlier = conversation.open_assistant_turn("earlier answer", None);
    conversation.close_turn(earlier, TurnStatus::Complete);

    let err = client(&server, Some("tok"))
        .send(
            &mut conversation,
            "Plan my week",
            &ChatOptions::default(),
            &StreamControl::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, GenieError::EmptyResponse));
    assert_eq!(conversation.len(), 2);
    assert_eq!(conversation.last().unwrap().content, "earlier answer");
}

#[tokio::test]
async fn test_history_is_sent_with_prompt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "messages": [
                {"role": "user", "content": "first"},
                {"role": "assistant", "content": "answer"},
                {"role": "user", "content": "second"}
            ]
        })))
        .respond_with(event_stream(&[
            r#"data: {"choices":[{"delta":{"content":"ok"}}]}"#,
            "data: [DONE]",
        ]))
        .expect(1)
        .mount(&server)
        .await;

    let mut conversation = Conversation::new();
    conversation.push_user_turn("first");
    let answer = conversation.open_assistant_turn("answer", None);
    conversation.close_turn(answer, TurnStatus::Complete);

    let shared = SharedConversation::new(conversation);
    let turn = client(&server, Some("tok"))
        .send_shared(&shared, "second", &ChatOptions::new(ChatSurface::Inline), &StreamControl::default())
        .await
        .unwrap();

    assert_eq!(turn.text, "ok");
    assert_eq!(shared.lock().len(), 4);
}

#[tokio::test]
async fn test_slow_headers_time_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(event_stream(&["data: [DONE]"]).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let mut conversation = Conversation::new();
    let err = client(&server, Some("tok"))
        .send(
            &mut conversation,
            "Plan my week",
            &ChatOptions::default(),
            &StreamControl::with_timeout(Duration::from_millis(100)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, GenieError::Timeout(d) if d == Duration::from_millis(100)));
    assert!(conversation.is_empty());
}
