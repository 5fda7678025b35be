//! Anthropic provider wire format tests.

use guardpost::providers::anthropic::{build_request, parse_response};
use guardpost::providers::{ChatMessage, CompletionRequest, ProviderError};

fn simple_request() -> CompletionRequest {
    CompletionRequest {
        system: "You are helpful.".to_owned(),
        messages: vec![ChatMessage::user("Hello")],
        max_tokens: 1024,
        temperature: 0.7,
    }
}

#[test]
fn build_request_sets_model_and_system() {
    let req = build_request("claude-sonnet", &simple_request());
    assert_eq!(req.model, "claude-sonnet");
    assert_eq!(req.system, "You are helpful.");
    assert_eq!(req.max_tokens, 1024);
    assert!((req.temperature - 0.7).abs() < f64::EPSILON);
}

#[test]
fn build_request_maps_roles() {
    let request = CompletionRequest {
        system: String::new(),
        messages: vec![
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
            ChatMessage::user("question"),
        ],
        max_tokens: 256,
        temperature: 0.0,
    };
    let req = build_request("model", &request);
    assert_eq!(req.messages[0].role, "user");
    assert_eq!(req.messages[1].role, "assistant");
    assert_eq!(req.messages[2].role, "user");
    assert_eq!(req.messages[2].content, "question");
}

#[test]
fn request_serializes_with_expected_keys() {
    let req = build_request("m", &simple_request());
    let value = serde_json::to_value(&req).unwrap_or_default();
    assert!(value.get("model").is_some());
    assert!(value.get("system").is_some());
    assert!(value.get("max_tokens").is_some());
    assert!(value.get("temperature").is_some());
    assert!(value["messages"].is_array());
}

#[test]
fn parse_response_joins_text_blocks() {
    let body = r#"{
        "content": [
            {"type": "text", "text": "Hello "},
            {"type": "text", "text": "there!"}
        ],
        "usage": {"input_tokens": 12, "output_tokens": 4}
    }"#;
    let resp = parse_response(body).unwrap_or_else(|e| panic!("parse failed: {e}"));
    assert_eq!(resp.text, "Hello there!");
    assert_eq!(resp.usage.input_tokens, 12);
    assert_eq!(resp.usage.output_tokens, 4);
}

#[test]
fn parse_response_rejects_empty_content() {
    let body = r#"{"content": [], "usage": {"input_tokens": 1, "output_tokens": 0}}"#;
    assert!(matches!(parse_response(body), Err(ProviderError::Parse(_))));
}

#[test]
fn parse_response_rejects_malformed_json() {
    assert!(matches!(
        parse_response("not json at all"),
        Err(ProviderError::Parse(_))
    ));
}
