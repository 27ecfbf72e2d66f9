//! PaLM provider against a mock `generateMessage` endpoint.

use relay_core::{
    ChatChunk, ChatMessage, ChatRequest, FinishReason, RelayError, ReqwestTransport, SseFrame,
    TransportConfig,
};
use relay_providers::{CallContext, PalmConfig, PalmProvider, Provider};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CHAT_PATH: &str = "/v1beta2/models/chat-bison-001:generateMessage";

fn provider(server: &MockServer) -> Provider {
    let transport = ReqwestTransport::new(&TransportConfig::default()).expect("transport");
    PalmProvider::new(
        PalmConfig::new("palm").with_base_url(server.uri()),
        Arc::new(transport),
    )
    .into()
}

fn request(messages: Vec<ChatMessage>, n: u32) -> ChatRequest {
    ChatRequest::builder()
        .model("chat-bison-001")
        .messages(messages)
        .n(n)
        .build()
        .expect("request")
}

fn context(prompt_tokens: u32) -> CallContext {
    CallContext::new("palm-key", prompt_tokens)
}

#[tokio::test]
async fn test_candidates_become_choices() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .and(query_param("key", "palm-key"))
        .and(body_partial_json(json!({
            "prompt": {"messages": [
                {"author": "0", "content": "one"},
                {"author": "1", "content": "two"},
                {"author": "0", "content": "three"}
            ]},
            "candidateCount": 3
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [
                {"author": "1", "content": "alpha"},
                {"author": "1", "content": "beta"},
                {"author": "1", "content": "gamma"}
            ],
            "messages": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let messages = vec![
        ChatMessage::user("one"),
        ChatMessage::assistant("two"),
        ChatMessage::user("three"),
    ];
    let response = provider(&server)
        .chat_completion(&request(messages, 3), &context(7))
        .await
        .expect("response");

    assert_eq!(response.choices.len(), 3);
    for (i, choice) in response.choices.iter().enumerate() {
        assert_eq!(choice.index as usize, i);
        assert_eq!(choice.finish_reason, Some(FinishReason::Stop));
    }
    assert_eq!(response.first_content(), Some("alpha"));
    assert!(response.id.starts_with("chatcmpl-"));
    assert_eq!(response.object, "chat.completion");

    // "alpha" is five characters, two tokens under the default estimator
    assert_eq!(response.usage.prompt_tokens, 7);
    assert_eq!(response.usage.completion_tokens, 2);
    assert_eq!(
        response.usage.total_tokens,
        response.usage.prompt_tokens + response.usage.completion_tokens
    );
}

#[tokio::test]
async fn test_error_envelope_keeps_status_and_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {
                "code": 400,
                "message": "API key not valid. Please pass a valid API key.",
                "status": "INVALID_ARGUMENT"
            }
        })))
        .mount(&server)
        .await;

    let err = provider(&server)
        .chat_completion(&request(vec![ChatMessage::user("hi")], 1), &context(1))
        .await
        .expect_err("upstream error");

    match err {
        RelayError::Upstream {
            status,
            message,
            error_type,
            code,
        } => {
            assert_eq!(status, 400);
            assert_eq!(message, "API key not valid. Please pass a valid API key.");
            assert_eq!(error_type, "INVALID_ARGUMENT");
            assert_eq!(code.as_deref(), Some("400"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_zero_candidates_is_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "filters": [{"reason": "OTHER"}]
        })))
        .mount(&server)
        .await;

    let err = provider(&server)
        .chat_completion(&request(vec![ChatMessage::user("hi")], 1), &context(1))
        .await
        .expect_err("no candidates");
    assert!(matches!(err, RelayError::Upstream { status: 200, .. }));
}

#[tokio::test]
async fn test_undecodable_body_is_translation_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let err = provider(&server)
        .chat_completion(&request(vec![ChatMessage::user("hi")], 1), &context(1))
        .await
        .expect_err("translation");
    assert!(matches!(err, RelayError::Translation { .. }));
    assert_eq!(err.status_code(), 500);
}

#[tokio::test]
async fn test_emulated_stream_single_chunk() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"author": "1", "content": "hello"}]
        })))
        .mount(&server)
        .await;

    let stream = provider(&server)
        .chat_completion_stream(&request(vec![ChatMessage::user("hi")], 1), &context(4))
        .await
        .expect("stream");
    let (frames, usage) = stream.collect().await;

    assert_eq!(frames.len(), 2);
    let chunk: ChatChunk = serde_json::from_str(frames[0].data()).expect("chunk");
    assert_eq!(chunk.first_content(), Some("hello"));
    assert_eq!(chunk.object, "chat.completion.chunk");
    assert!(chunk.id.starts_with("chatcmpl-"));
    assert_eq!(chunk.choices[0].finish_reason, Some(FinishReason::Stop));
    assert_eq!(frames[1], SseFrame::Done);
    assert_eq!(frames[1].encode().as_ref(), b"data: [DONE]\n\n");

    let usage = usage.expect("usage");
    assert_eq!(usage.prompt_tokens, 4);
    assert_eq!(usage.completion_tokens, 2);
}

#[tokio::test]
async fn test_emulated_stream_zero_candidates() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
        .mount(&server)
        .await;

    let stream = provider(&server)
        .chat_completion_stream(&request(vec![ChatMessage::user("hi")], 1), &context(4))
        .await
        .expect("stream");
    let (frames, usage) = stream.collect().await;

    assert_eq!(frames, vec![SseFrame::Done]);
    assert_eq!(usage.map(|u| u.completion_tokens), Some(0));
}

#[tokio::test]
async fn test_stream_error_status_produces_no_stream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}
        })))
        .mount(&server)
        .await;

    let err = provider(&server)
        .chat_completion_stream(&request(vec![ChatMessage::user("hi")], 1), &context(1))
        .await
        .expect_err("no stream");
    assert!(matches!(err, RelayError::Upstream { status: 429, ref message, .. } if message == "Quota exceeded"));
}

#[tokio::test]
async fn test_empty_key_makes_no_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = provider(&server)
        .chat_completion(
            &request(vec![ChatMessage::user("hi")], 1),
            &CallContext::new("", 1),
        )
        .await
        .expect_err("empty key");
    assert!(matches!(err, RelayError::MalformedCredential { .. }));
}
