//! Retry schedule and fallback behavior, driven by a scripted provider.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use guardpost::providers::retry::{invoke_with_schedule, ModelOutcome};
use guardpost::providers::{
    ChatMessage, CompletionRequest, CompletionResponse, FailureKind, ModelProvider, ProviderError,
    UsageStats,
};

/// Provider that plays back a fixed script of results.
struct ScriptedProvider {
    script: Mutex<Vec<Result<CompletionResponse, ProviderError>>>,
    calls: Mutex<usize>,
}

impl ScriptedProvider {
    fn new(script: Vec<Result<CompletionResponse, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script),
            calls: Mutex::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.lock().map(|c| *c).unwrap_or(0)
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    async fn complete(
        &self,
        _request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls = calls.saturating_add(1);
        }
        match self.script.lock() {
            Ok(mut script) if !script.is_empty() => script.remove(0),
            _ => Err(ProviderError::Parse("script exhausted".to_owned())),
        }
    }

    fn model_id(&self) -> &str {
        "scripted-model"
    }
}

fn ok_response(text: &str) -> Result<CompletionResponse, ProviderError> {
    Ok(CompletionResponse {
        text: text.to_owned(),
        usage: UsageStats {
            input_tokens: 10,
            output_tokens: 5,
        },
    })
}

fn request() -> CompletionRequest {
    CompletionRequest {
        system: "sys".to_owned(),
        messages: vec![ChatMessage::user("hi")],
        max_tokens: 64,
        temperature: 0.0,
    }
}

const ZERO_DELAYS: &[Duration] = &[Duration::ZERO, Duration::ZERO, Duration::ZERO];

const FALLBACK: &str = "please email us instead";

#[tokio::test]
async fn rate_limits_are_retried_until_success() {
    let provider = ScriptedProvider::new(vec![
        Err(ProviderError::RateLimited),
        Err(ProviderError::RateLimited),
        ok_response("finally"),
    ]);

    let outcome = invoke_with_schedule(&provider, request(), FALLBACK, ZERO_DELAYS).await;
    match outcome {
        ModelOutcome::Reply { text, usage } => {
            assert_eq!(text, "finally");
            assert_eq!(usage.output_tokens, 5);
        }
        ModelOutcome::Fallback { .. } => panic!("expected a reply"),
    }
    assert_eq!(provider.calls(), 3);
}

#[tokio::test]
async fn exhausted_schedule_falls_back() {
    let provider = ScriptedProvider::new(vec![
        Err(ProviderError::RateLimited),
        Err(ProviderError::RateLimited),
        Err(ProviderError::RateLimited),
        Err(ProviderError::RateLimited),
    ]);

    let outcome = invoke_with_schedule(&provider, request(), FALLBACK, ZERO_DELAYS).await;
    match outcome {
        ModelOutcome::Fallback { text, error } => {
            assert_eq!(text, FALLBACK);
            assert_eq!(error, FailureKind::RateLimited);
        }
        ModelOutcome::Reply { .. } => panic!("expected fallback"),
    }
    // The schedule allows the initial attempt plus three retries.
    assert_eq!(provider.calls(), 4);
}

#[tokio::test]
async fn overload_falls_back_without_retrying() {
    let provider = ScriptedProvider::new(vec![Err(ProviderError::Overloaded), ok_response("late")]);

    let outcome = invoke_with_schedule(&provider, request(), FALLBACK, ZERO_DELAYS).await;
    match outcome {
        ModelOutcome::Fallback { error, .. } => assert_eq!(error, FailureKind::Overloaded),
        ModelOutcome::Reply { .. } => panic!("expected fallback"),
    }
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn generic_errors_fall_back_immediately() {
    let provider =
        ScriptedProvider::new(vec![Err(ProviderError::Parse("bad body".to_owned()))]);

    let outcome = invoke_with_schedule(&provider, request(), FALLBACK, ZERO_DELAYS).await;
    match outcome {
        ModelOutcome::Fallback { error, .. } => assert_eq!(error, FailureKind::Other),
        ModelOutcome::Reply { .. } => panic!("expected fallback"),
    }
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn first_try_success_skips_the_schedule() {
    let provider = ScriptedProvider::new(vec![ok_response("right away")]);
    let outcome = invoke_with_schedule(&provider, request(), FALLBACK, ZERO_DELAYS).await;
    assert!(matches!(outcome, ModelOutcome::Reply { .. }));
    assert_eq!(provider.calls(), 1);
}
