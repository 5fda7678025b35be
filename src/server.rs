//! HTTP channel adapters: the web chat JSON API and the SMS carrier webhook.
//!
//! Adapters translate between their channel's wire shape and the shared
//! [`Pipeline`]; no guardrail or model logic lives here. Each adapter owns
//! its failure mode: the web API returns a JSON error envelope that still
//! carries usable reply text, and the SMS webhook always answers with valid
//! XML so the carrier never retries into a loop.

use std::sync::Arc;

use axum::extract::{Form, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::format::segment_sms;
use crate::pipeline::Pipeline;
use crate::sanitize::MAX_INPUT_CHARS;
use crate::store::Channel;

/// Shared handler state.
pub type AppState = Arc<Pipeline>;

/// Build the full application router.
pub fn router(pipeline: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat))
        .route("/api/chat/end", post(chat_end))
        .route("/api/chat/history/{session_id}", get(chat_history))
        .route("/api/sms/webhook", post(sms_webhook))
        .with_state(pipeline)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

// ---------------------------------------------------------------------------
// Web chat
// ---------------------------------------------------------------------------

/// Inbound web chat request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// User message text.
    pub message: String,
    /// Client-held session id; generated on first contact when absent.
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Web chat response body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    /// Final reply text.
    pub response: String,
    /// Session id the client must echo on the next turn.
    pub session_id: String,
    /// Whether this turn was escalated to a human.
    pub escalation: bool,
    /// Conversation row id.
    pub conversation_id: i64,
}

async fn chat(
    State(pipeline): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Response {
    if request.message.trim().is_empty() {
        return validation_error("message is required");
    }
    if request.message.chars().count() > MAX_INPUT_CHARS {
        return validation_error("message is too long");
    }

    let session_id = match request.session_id {
        Some(id) if !id.trim().is_empty() => id,
        _ => format!("web_{}", Uuid::new_v4()),
    };

    match pipeline
        .handle_message(&session_id, Channel::Web, &request.message)
        .await
    {
        Ok(outcome) => Json(ChatResponse {
            response: outcome.reply,
            session_id,
            escalation: outcome.escalated,
            conversation_id: outcome.conversation_id,
        })
        .into_response(),
        Err(err) => {
            error!(%err, session_id, "chat request failed");
            storage_error()
        }
    }
}

/// Request body for ending a web chat session.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndRequest {
    /// Session to close.
    pub session_id: String,
}

async fn chat_end(
    State(pipeline): State<AppState>,
    Json(request): Json<EndRequest>,
) -> Response {
    if request.session_id.trim().is_empty() {
        return validation_error("sessionId is required");
    }
    match pipeline
        .end_session(&request.session_id, Channel::Web)
        .await
    {
        Ok(()) => Json(json!({ "ended": true })).into_response(),
        Err(err) => {
            error!(%err, session_id = request.session_id, "end request failed");
            storage_error()
        }
    }
}

async fn chat_history(
    State(pipeline): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    let result = async {
        let conversation = pipeline
            .store()
            .find_or_create_conversation(&session_id, Channel::Web)
            .await?;
        pipeline.store().message_history(conversation.id).await
    }
    .await;

    match result {
        Ok(messages) => {
            let items: Vec<_> = messages
                .iter()
                .map(|m| {
                    json!({
                        "role": m.role.as_str(),
                        "content": m.content,
                        "createdAt": m.created_at.to_rfc3339(),
                    })
                })
                .collect();
            Json(json!({ "sessionId": session_id, "messages": items })).into_response()
        }
        Err(err) => {
            error!(%err, session_id, "history request failed");
            storage_error()
        }
    }
}

fn validation_error(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message })),
    )
        .into_response()
}

fn storage_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": "internal error",
            "response": "Sorry, something went wrong on our end. Please try again in a moment.",
        })),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// SMS webhook
// ---------------------------------------------------------------------------

/// Carrier webhook form body. Field names follow the carrier's casing.
#[derive(Debug, Deserialize)]
pub struct SmsWebhook {
    /// Sender phone number.
    #[serde(rename = "From")]
    pub from: String,
    /// Message text.
    #[serde(rename = "Body", default)]
    pub body: String,
}

const SMS_OPT_OUT_WORDS: &[&str] = &["stop", "unsubscribe", "cancel", "quit"];

const SMS_COMPLIANCE_SUFFIX: &str = "Reply STOP to unsubscribe.";

async fn sms_webhook(
    State(pipeline): State<AppState>,
    Form(webhook): Form<SmsWebhook>,
) -> Response {
    let digits: String = webhook.from.chars().filter(char::is_ascii_digit).collect();
    let session_id = format!("sms_{digits}");
    let trimmed = webhook.body.trim();

    // Carrier-mandated opt-out words short-circuit the pipeline entirely.
    if SMS_OPT_OUT_WORDS.contains(&trimmed.to_lowercase().as_str()) {
        info!(session_id, "sms opt-out received");
        if let Err(err) = pipeline.end_session(&session_id, Channel::Sms).await {
            error!(%err, session_id, "sms opt-out persist failed");
        }
        return xml_response(&[
            "You've been unsubscribed and won't receive further messages. Reply START to opt back in.".to_owned(),
        ]);
    }

    match pipeline
        .handle_message(&session_id, Channel::Sms, &webhook.body)
        .await
    {
        Ok(outcome) => {
            let mut text = outcome.reply;
            if outcome.first_reply {
                text.push_str("\n\n");
                text.push_str(SMS_COMPLIANCE_SUFFIX);
            }
            xml_response(&segment_sms(&text))
        }
        Err(err) => {
            // Always valid XML back to the carrier, or it retries the
            // webhook on a loop.
            error!(%err, session_id, "sms request failed");
            xml_response(&[
                "Sorry, we're having technical trouble. Please try again shortly.".to_owned(),
            ])
        }
    }
}

fn xml_response(segments: &[String]) -> Response {
    let mut body = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Response>");
    for segment in segments {
        body.push_str("<Message>");
        body.push_str(&escape_xml(segment));
        body.push_str("</Message>");
    }
    body.push_str("</Response>");
    ([(header::CONTENT_TYPE, "text/xml")], body).into_response()
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
    out
}
