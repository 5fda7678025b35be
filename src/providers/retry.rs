//! Model invocation wrapper: classified failures, bounded retry, fallback.
//!
//! Rate-limit failures retry on a fixed delay schedule (an explicit loop,
//! not recursion, so the attempt count is a first-class parameter); every
//! other failure falls back immediately. The wrapper never re-raises to the
//! caller — a pipeline must never surface a raw provider failure to an end
//! user.

use std::time::Duration;

use tracing::{info, warn};

use super::{CompletionRequest, FailureKind, ModelProvider, UsageStats};

/// Backoff schedule for rate-limited calls: the slice length is the retry
/// count, each entry the delay before that retry.
pub const RETRY_DELAYS: &[Duration] = &[
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
];

/// The outcome of an invocation, fallback included.
#[derive(Debug, Clone)]
pub enum ModelOutcome {
    /// The model answered.
    Reply {
        /// Generated text.
        text: String,
        /// Token usage.
        usage: UsageStats,
    },
    /// All attempts failed; the fixed fallback text stands in.
    Fallback {
        /// Fallback text shown to the user.
        text: String,
        /// Classification of the final failure, for metadata and logs.
        error: FailureKind,
    },
}

/// Invoke the provider with the default backoff schedule.
pub async fn invoke_with_fallback(
    provider: &dyn ModelProvider,
    request: CompletionRequest,
    fallback_text: &str,
) -> ModelOutcome {
    invoke_with_schedule(provider, request, fallback_text, RETRY_DELAYS).await
}

/// Invoke the provider with an explicit backoff schedule (testable).
///
/// Only rate-limit failures consume the schedule; overload and generic
/// failures fall back without retrying.
pub async fn invoke_with_schedule(
    provider: &dyn ModelProvider,
    request: CompletionRequest,
    fallback_text: &str,
    delays: &[Duration],
) -> ModelOutcome {
    let mut attempt = 0usize;
    loop {
        match provider.complete(request.clone()).await {
            Ok(response) => {
                return ModelOutcome::Reply {
                    text: response.text,
                    usage: response.usage,
                };
            }
            Err(err) => {
                let kind = err.kind();
                match kind {
                    FailureKind::RateLimited if attempt < delays.len() => {
                        info!(attempt, delay = ?delays[attempt], "rate limited, backing off");
                        tokio::time::sleep(delays[attempt]).await;
                        attempt = attempt.saturating_add(1);
                    }
                    _ => {
                        warn!(error = %err, kind = kind.as_str(), "model call failed, using fallback");
                        return ModelOutcome::Fallback {
                            text: fallback_text.to_owned(),
                            error: kind,
                        };
                    }
                }
            }
        }
    }
}
