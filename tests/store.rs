//! Integration tests for `src/store.rs` against an in-memory database.

use guardpost::lead::LeadInfo;
use guardpost::store::{
    Channel, ConversationStatus, KnowledgeCategory, KnowledgeEntry, MessageRole, Store,
};
use serde_json::json;

async fn store() -> Store {
    Store::open_in_memory()
        .await
        .unwrap_or_else(|e| panic!("in-memory store: {e}"))
}

#[tokio::test]
async fn first_contact_creates_an_active_conversation() {
    let store = store().await;
    let conv = store
        .find_or_create_conversation("web_abc", Channel::Web)
        .await
        .unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(conv.session_id, "web_abc");
    assert_eq!(conv.channel, Channel::Web);
    assert_eq!(conv.status, ConversationStatus::Active);
    assert_eq!(conv.parent_name, None);
}

#[tokio::test]
async fn repeat_contact_reuses_the_conversation() {
    let store = store().await;
    let first = store
        .find_or_create_conversation("sms_15035550123", Channel::Sms)
        .await
        .unwrap_or_else(|e| panic!("{e}"));
    let second = store
        .find_or_create_conversation("sms_15035550123", Channel::Sms)
        .await
        .unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(first.id, second.id);
    assert_eq!(second.channel, Channel::Sms);
}

#[tokio::test]
async fn messages_come_back_in_order_with_metadata() {
    let store = store().await;
    let conv = store
        .find_or_create_conversation("s", Channel::Web)
        .await
        .unwrap_or_else(|e| panic!("{e}"));

    store
        .save_message(conv.id, MessageRole::User, "hi", json!({}))
        .await
        .unwrap_or_else(|e| panic!("{e}"));
    store
        .save_message(
            conv.id,
            MessageRole::Assistant,
            "hello!",
            json!({"model": "m", "output_tokens": 7}),
        )
        .await
        .unwrap_or_else(|e| panic!("{e}"));

    let history = store
        .message_history(conv.id)
        .await
        .unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, MessageRole::User);
    assert_eq!(history[1].role, MessageRole::Assistant);
    assert_eq!(history[1].metadata["output_tokens"], 7);

    let count = store
        .assistant_message_count(conv.id)
        .await
        .unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(count, 1);
}

#[tokio::test]
async fn lead_updates_merge_across_messages() {
    let store = store().await;
    let conv = store
        .find_or_create_conversation("s", Channel::Web)
        .await
        .unwrap_or_else(|e| panic!("{e}"));

    let first = LeadInfo {
        email: Some("jane@example.com".to_owned()),
        ..LeadInfo::default()
    };
    store
        .update_lead(conv.id, &first)
        .await
        .unwrap_or_else(|e| panic!("{e}"));

    let second = LeadInfo {
        name: Some("Jane Smith".to_owned()),
        program_interest: Some("Robotics".to_owned()),
        ..LeadInfo::default()
    };
    store
        .update_lead(conv.id, &second)
        .await
        .unwrap_or_else(|e| panic!("{e}"));

    let conv = store
        .find_or_create_conversation("s", Channel::Web)
        .await
        .unwrap_or_else(|e| panic!("{e}"));
    // The second update must not clear the earlier email.
    assert_eq!(conv.parent_email.as_deref(), Some("jane@example.com"));
    assert_eq!(conv.parent_name.as_deref(), Some("Jane Smith"));
    assert_eq!(conv.program_interest.as_deref(), Some("Robotics"));
    assert_eq!(conv.parent_phone, None);
}

#[tokio::test]
async fn escalation_is_one_way_and_reasons_overwrite() {
    let store = store().await;
    let conv = store
        .find_or_create_conversation("s", Channel::Web)
        .await
        .unwrap_or_else(|e| panic!("{e}"));

    store
        .escalate_conversation(conv.id, "complaint")
        .await
        .unwrap_or_else(|e| panic!("{e}"));
    store
        .escalate_conversation(conv.id, "billing_issue")
        .await
        .unwrap_or_else(|e| panic!("{e}"));

    let conv = store
        .find_or_create_conversation("s", Channel::Web)
        .await
        .unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(conv.status, ConversationStatus::Escalated);
    assert_eq!(conv.escalation_reason.as_deref(), Some("billing_issue"));
}

#[tokio::test]
async fn ended_conversations_cannot_be_escalated() {
    let store = store().await;
    let conv = store
        .find_or_create_conversation("s", Channel::Web)
        .await
        .unwrap_or_else(|e| panic!("{e}"));

    store
        .end_conversation(conv.id)
        .await
        .unwrap_or_else(|e| panic!("{e}"));
    store
        .escalate_conversation(conv.id, "too late")
        .await
        .unwrap_or_else(|e| panic!("{e}"));

    let conv = store
        .find_or_create_conversation("s", Channel::Web)
        .await
        .unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(conv.status, ConversationStatus::Ended);
    assert_eq!(conv.escalation_reason, None);
}

#[tokio::test]
async fn only_active_knowledge_is_served() {
    let store = store().await;
    let live = KnowledgeEntry {
        category: KnowledgeCategory::Programs,
        title: "Robotics".to_owned(),
        content: "LEGO robotics for K-8.".to_owned(),
    };
    let retired = KnowledgeEntry {
        category: KnowledgeCategory::Pricing,
        title: "Old pricing".to_owned(),
        content: "Out of date.".to_owned(),
    };
    store
        .insert_knowledge(&live, true)
        .await
        .unwrap_or_else(|e| panic!("{e}"));
    store
        .insert_knowledge(&retired, false)
        .await
        .unwrap_or_else(|e| panic!("{e}"));

    let entries = store
        .active_knowledge()
        .await
        .unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].title, "Robotics");
    assert_eq!(entries[0].category, KnowledgeCategory::Programs);
}
