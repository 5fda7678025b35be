//! Model provider abstraction layer.
//!
//! Defines the [`ModelProvider`] trait and the shared request/response types.
//! One provider is implemented — [`anthropic::AnthropicProvider`] for the
//! `/v1/messages` API — and [`retry`] wraps any provider with classified
//! failure handling: bounded backoff for rate limits, immediate fallback for
//! everything else, and never a raw error surfaced to an end user.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod anthropic;
pub mod retry;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

/// Conversation participant role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// Human user message.
    User,
    /// Assistant (model) message.
    Assistant,
}

/// A single turn in a conversation sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of the message author.
    pub role: ChatRole,
    /// Plain text content.
    pub content: String,
}

impl ChatMessage {
    /// A user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    /// An assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A request to the model provider for a completion.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// System prompt (grounding block plus rule set).
    pub system: String,
    /// Conversation history including the latest user turn.
    pub messages: Vec<ChatMessage>,
    /// Maximum tokens in the response.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
}

/// Token usage for a completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    /// Tokens consumed by the prompt.
    pub input_tokens: u32,
    /// Tokens generated in the response.
    pub output_tokens: u32,
}

/// The response from the model provider.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Generated text.
    pub text: String,
    /// Token usage for metadata and budgeting.
    pub usage: UsageStats,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by model providers.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Upstream asked us to slow down (HTTP 429).
    #[error("provider rate limited")]
    RateLimited,
    /// Upstream is overloaded (HTTP 529) or the call timed out.
    #[error("provider overloaded")]
    Overloaded,
    /// HTTP transport failure.
    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Response did not match the expected schema.
    #[error("provider response parse error: {0}")]
    Parse(String),
    /// Upstream responded with some other error status.
    #[error("provider returned non-success status {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Raw response body, truncated.
        body: String,
    },
}

/// Coarse failure classification driving retry/fallback behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Retry with bounded exponential backoff.
    RateLimited,
    /// Fall back immediately, no retry.
    Overloaded,
    /// Fall back immediately, no retry.
    Other,
}

impl FailureKind {
    /// Stable string stored in message metadata on fallback turns.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::Overloaded => "api_overloaded",
            Self::Other => "api_error",
        }
    }
}

impl ProviderError {
    /// Classify this error for the retry wrapper.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::RateLimited => FailureKind::RateLimited,
            Self::Overloaded => FailureKind::Overloaded,
            // A timed-out call is indistinguishable from an overloaded
            // provider from the caller's perspective.
            Self::Request(e) if e.is_timeout() => FailureKind::Overloaded,
            Self::Request(_) | Self::Parse(_) | Self::HttpStatus { .. } => FailureKind::Other,
        }
    }
}

/// Check HTTP response status, classifying rate-limit and overload statuses.
///
/// # Errors
///
/// Returns `ProviderError::RateLimited` on 429, `ProviderError::Overloaded`
/// on 529, `ProviderError::HttpStatus` on any other non-2xx, and
/// `ProviderError::Request` on transport failure.
pub async fn check_http_response(response: reqwest::Response) -> Result<String, ProviderError> {
    let status = response.status().as_u16();
    let body = response.text().await?;
    match status {
        200..=299 => Ok(body),
        429 => Err(ProviderError::RateLimited),
        529 => Err(ProviderError::Overloaded),
        _ => Err(ProviderError::HttpStatus {
            status,
            body: truncate_error_body(&body),
        }),
    }
}

fn truncate_error_body(raw: &str) -> String {
    const MAX_ERROR_BODY_CHARS: usize = 256;
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() > MAX_ERROR_BODY_CHARS {
        let shortened: String = collapsed.chars().take(MAX_ERROR_BODY_CHARS).collect();
        return format!("{shortened}...[truncated]");
    }
    collapsed
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Core model provider interface.
///
/// Implementations must be `Send + Sync` so one instance can serve all
/// request tasks.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Request a completion.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] on API, network, or parse failure.
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError>;

    /// The model identifier string this provider serves.
    fn model_id(&self) -> &str;
}
