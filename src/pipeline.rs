//! End-to-end message handling: persistence, guardrails, model call,
//! post-processing, and escalation, in a fixed order.
//!
//! The ordering contracts live here. The user turn is persisted before the
//! model is invoked, so a provider crash never loses the inbound message.
//! The history snapshot for the model is taken before that persist, so the
//! current turn appears exactly once (as the final request message). A
//! blocked verdict and a model invocation are mutually exclusive, and a
//! provider fallback skips the post-receive chain entirely.

use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tracing::{info, warn};

use crate::config::Config;
use crate::context::{build_system_prompt, flag_hints, history_for_model, trim_history};
use crate::guardrails::flood::FloodMonitor;
use crate::guardrails::{postreceive, presend, Reason};
use crate::lead::extract_lead_info;
use crate::providers::retry::{invoke_with_fallback, ModelOutcome};
use crate::providers::{ChatMessage, ChatRole, CompletionRequest, ModelProvider};
use crate::sanitize::sanitize;
use crate::store::{Channel, MessageRole, Store, StoreError};

/// What the caller gets back for one inbound message.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    /// Final user-facing reply text.
    pub reply: String,
    /// Whether this turn escalated the conversation.
    pub escalated: bool,
    /// Owning conversation row id.
    pub conversation_id: i64,
    /// True when this reply is the first assistant turn of the conversation.
    pub first_reply: bool,
}

/// Pipeline failures surfaced to channel adapters.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Persistence failed; the adapter answers with its carrier-safe fallback.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The wired-together message pipeline shared across channels.
pub struct Pipeline {
    store: Store,
    provider: Arc<dyn ModelProvider>,
    flood: Arc<FloodMonitor>,
    config: Config,
}

impl Pipeline {
    /// Assemble a pipeline from its parts.
    pub fn new(
        store: Store,
        provider: Arc<dyn ModelProvider>,
        flood: Arc<FloodMonitor>,
        config: Config,
    ) -> Self {
        Self {
            store,
            provider,
            flood,
            config,
        }
    }

    /// Shared store handle, for adapters that read history directly.
    pub fn store(&self) -> &Store {
        &self.store
    }

    fn fallback_text(&self) -> String {
        format!(
            "I'm having trouble connecting right now. Please email us at {} or \
             call {} and we'll get back to you shortly!",
            self.config.org.email, self.config.org.phone
        )
    }

    /// Handle one inbound user message end to end.
    ///
    /// # Errors
    ///
    /// Returns an error only on storage failure; provider failures are
    /// absorbed into the fallback reply.
    pub async fn handle_message(
        &self,
        session_id: &str,
        channel: Channel,
        raw_text: &str,
    ) -> Result<ChatOutcome, PipelineError> {
        let started = Instant::now();
        let conversation = self
            .store
            .find_or_create_conversation(session_id, channel)
            .await?;
        let conversation_id = conversation.id;
        let first_reply = self.store.assistant_message_count(conversation_id).await? == 0;

        // Snapshot before persisting the current turn so it is not doubled
        // in the model request.
        let prior = self.store.message_history(conversation_id).await?;

        let text = sanitize(raw_text);
        let verdict = presend::apply_guardrails(
            &text,
            session_id,
            &self.flood,
            &self.config.org.allowed_domains,
        );
        let medical_flagged = verdict.has_flag(Reason::MedicalKeyword);

        // A disclosed date of birth never reaches storage or the model; the
        // record keeps an age range instead.
        let dob_flagged = verdict.has_flag(Reason::DobShared);
        let text = if dob_flagged {
            presend::redact_dob(&text)
        } else {
            text
        };
        let user_metadata = if dob_flagged {
            json!({ "dob_redacted": true })
        } else {
            json!({})
        };
        self.store
            .save_message(conversation_id, MessageRole::User, &text, user_metadata)
            .await?;

        let lead = extract_lead_info(&text, &self.config.org);
        if !lead.is_empty() {
            info!(conversation_id, ?lead, "lead details captured");
            self.store.update_lead(conversation_id, &lead).await?;
        }

        if verdict.blocked {
            let reason = verdict.reason.map(Reason::as_str).unwrap_or("unknown");
            let reply = verdict.reply.clone().unwrap_or_else(|| self.fallback_text());
            warn!(conversation_id, reason, "inbound message blocked");
            self.store
                .save_message(
                    conversation_id,
                    MessageRole::Assistant,
                    &reply,
                    json!({ "blocked": true, "reason": reason }),
                )
                .await?;
            return Ok(ChatOutcome {
                reply,
                escalated: false,
                conversation_id,
                first_reply,
            });
        }

        let knowledge = self.store.active_knowledge().await?;
        let mut system = build_system_prompt(&knowledge, &self.config.org);
        if let Some(hints) = flag_hints(&verdict.flags) {
            system.push_str(&hints);
        }
        let mut messages = history_for_model(trim_history(&to_chat_messages(&prior)));
        messages.push(ChatMessage::user(text.clone()));

        let request = CompletionRequest {
            system,
            messages,
            max_tokens: self.config.model.max_tokens,
            temperature: self.config.model.temperature,
        };

        let outcome =
            invoke_with_fallback(self.provider.as_ref(), request, &self.fallback_text()).await;

        let (model_text, metadata) = match outcome {
            ModelOutcome::Reply { text, usage } => {
                let meta = json!({
                    "model": self.provider.model_id(),
                    "input_tokens": usage.input_tokens,
                    "output_tokens": usage.output_tokens,
                    "processing_ms": u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                });
                (text, meta)
            }
            ModelOutcome::Fallback { text, error } => {
                // No post-receive pass on fallback text: it is already fixed
                // and safe.
                self.store
                    .save_message(
                        conversation_id,
                        MessageRole::Assistant,
                        &text,
                        json!({ "error": error.as_str() }),
                    )
                    .await?;
                return Ok(ChatOutcome {
                    reply: text,
                    escalated: false,
                    conversation_id,
                    first_reply,
                });
            }
        };

        let post = postreceive::check_escalation(&model_text, &text, &self.config.org);
        let reply = postreceive::post_process(&model_text, &post, medical_flagged, &self.config.org);

        self.store
            .save_message(conversation_id, MessageRole::Assistant, &reply, metadata)
            .await?;

        if post.escalate {
            let reason = post.reason.map(Reason::as_str).unwrap_or("unknown");
            info!(conversation_id, reason, "conversation escalated");
            self.store
                .escalate_conversation(conversation_id, reason)
                .await?;
        }

        Ok(ChatOutcome {
            reply,
            escalated: post.escalate,
            conversation_id,
            first_reply,
        })
    }

    /// Close a conversation at the user's request.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    pub async fn end_session(&self, session_id: &str, channel: Channel) -> Result<(), PipelineError> {
        let conversation = self
            .store
            .find_or_create_conversation(session_id, channel)
            .await?;
        self.store.end_conversation(conversation.id).await?;
        info!(conversation_id = conversation.id, "conversation ended");
        Ok(())
    }
}

fn to_chat_messages(stored: &[crate::store::StoredMessage]) -> Vec<ChatMessage> {
    stored
        .iter()
        .filter_map(|m| match m.role {
            MessageRole::User => Some(ChatMessage {
                role: ChatRole::User,
                content: m.content.clone(),
            }),
            MessageRole::Assistant => Some(ChatMessage {
                role: ChatRole::Assistant,
                content: m.content.clone(),
            }),
            MessageRole::System => None,
        })
        .collect()
}
