//! SQLite persistence for conversations, messages, and the knowledge base.
//!
//! The [`Store`] is the sole gateway to the database. Operations are
//! low-frequency direct queries through the pool; schema is created with an
//! idempotent batch on open, and an in-memory pool backs the tests.
//!
//! Conversation lifecycle is one-way: `active` → `escalated` | `ended`, and
//! `escalated` → `ended`. An escalated conversation keeps taking messages,
//! and each new escalation overwrites the stored reason.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::lead::LeadInfo;

// ---------------------------------------------------------------------------
// Domain types
// ---------------------------------------------------------------------------

/// Delivery channel a conversation arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Website chat widget.
    Web,
    /// SMS carrier webhook.
    Sms,
}

impl Channel {
    /// String form stored in SQLite.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Sms => "sms",
        }
    }

    /// Parse from a SQLite text value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a recognised channel.
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "web" => Ok(Self::Web),
            "sms" => Ok(Self::Sms),
            other => Err(StoreError::InvalidEnum {
                field: "channel",
                value: other.to_owned(),
            }),
        }
    }
}

/// Conversation lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    /// Ongoing automated exchange.
    Active,
    /// Marked for human follow-up; messages keep flowing.
    Escalated,
    /// Closed by the user or an administrator.
    Ended,
}

impl ConversationStatus {
    /// String form stored in SQLite.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Escalated => "escalated",
            Self::Ended => "ended",
        }
    }

    /// Parse from a SQLite text value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a recognised status.
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "active" => Ok(Self::Active),
            "escalated" => Ok(Self::Escalated),
            "ended" => Ok(Self::Ended),
            other => Err(StoreError::InvalidEnum {
                field: "status",
                value: other.to_owned(),
            }),
        }
    }
}

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Inbound user turn.
    User,
    /// Outbound assistant turn.
    Assistant,
    /// Pipeline annotation.
    System,
}

impl MessageRole {
    /// String form stored in SQLite.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }

    /// Parse from a SQLite text value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a recognised role.
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            other => Err(StoreError::InvalidEnum {
                field: "role",
                value: other.to_owned(),
            }),
        }
    }
}

/// Knowledge base entry category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnowledgeCategory {
    /// Program descriptions.
    Programs,
    /// Pricing facts.
    Pricing,
    /// Frequently asked questions.
    Faqs,
    /// Business policies.
    Policies,
}

impl KnowledgeCategory {
    /// String form stored in SQLite and used as a grounding-block heading.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Programs => "programs",
            Self::Pricing => "pricing",
            Self::Faqs => "faqs",
            Self::Policies => "policies",
        }
    }

    /// Parse from a SQLite text value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a recognised category.
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "programs" => Ok(Self::Programs),
            "pricing" => Ok(Self::Pricing),
            "faqs" => Ok(Self::Faqs),
            "policies" => Ok(Self::Policies),
            other => Err(StoreError::InvalidEnum {
                field: "category",
                value: other.to_owned(),
            }),
        }
    }
}

/// One continuous exchange, keyed by an opaque per-channel session id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Row id.
    pub id: i64,
    /// Opaque session identifier, unique per channel.
    pub session_id: String,
    /// Delivery channel.
    pub channel: Channel,
    /// Captured lead: parent name.
    pub parent_name: Option<String>,
    /// Captured lead: email.
    pub parent_email: Option<String>,
    /// Captured lead: phone.
    pub parent_phone: Option<String>,
    /// Captured lead: program interest label.
    pub program_interest: Option<String>,
    /// Lifecycle status.
    pub status: ConversationStatus,
    /// Reason for the most recent escalation, if any.
    pub escalation_reason: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

/// One immutable turn owned by a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Row id.
    pub id: i64,
    /// Owning conversation.
    pub conversation_id: i64,
    /// Author role.
    pub role: MessageRole,
    /// Text content.
    pub content: String,
    /// Free-form metadata (usage stats, blocked-reason tags).
    pub metadata: serde_json::Value,
    /// Creation time; messages are ordered by it.
    pub created_at: DateTime<Utc>,
}

/// One fact unit used to ground the model's replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    /// Entry category.
    pub category: KnowledgeCategory,
    /// Short title.
    pub title: String,
    /// Body text.
    pub content: String,
}

/// Storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying SQLite failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// A stored enum value did not parse.
    #[error("invalid {field} value in database: {value}")]
    InvalidEnum {
        /// Column name.
        field: &'static str,
        /// Offending value.
        value: String,
    },
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS conversations (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id         TEXT NOT NULL UNIQUE,
    channel            TEXT NOT NULL DEFAULT 'web',
    parent_name        TEXT,
    parent_email       TEXT,
    parent_phone       TEXT,
    program_interest   TEXT,
    status             TEXT NOT NULL DEFAULT 'active',
    escalation_reason  TEXT,
    created_at         TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at         TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS messages (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    conversation_id  INTEGER NOT NULL REFERENCES conversations(id),
    role             TEXT NOT NULL,
    content          TEXT NOT NULL,
    metadata         TEXT NOT NULL DEFAULT '{}',
    created_at       TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id);

CREATE TABLE IF NOT EXISTS knowledge_base (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    category    TEXT NOT NULL,
    title       TEXT NOT NULL,
    content     TEXT NOT NULL,
    is_active   INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
);
";

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// SQLite-backed store for conversations, messages, and knowledge entries.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if needed) the database at `url` and apply the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot connect or the schema fails.
    pub async fn open(url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new().connect(url).await?;
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// Open an in-memory database for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be created.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        // A single connection: each in-memory SQLite connection is its own
        // database, so a larger pool would see an empty schema.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// Fetch the conversation for `session_id`, creating it on first
    /// contact. An existing conversation has its `updated_at` touched.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure or unparseable stored values.
    pub async fn find_or_create_conversation(
        &self,
        session_id: &str,
        channel: Channel,
    ) -> Result<Conversation, StoreError> {
        sqlx::query(
            "INSERT INTO conversations (session_id, channel) VALUES (?1, ?2) \
             ON CONFLICT(session_id) DO UPDATE SET updated_at = datetime('now')",
        )
        .bind(session_id)
        .bind(channel.as_str())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT * FROM conversations WHERE session_id = ?1")
            .bind(session_id)
            .fetch_one(&self.pool)
            .await?;
        conversation_from_row(&row)
    }

    /// Append an immutable message to a conversation.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub async fn save_message(
        &self,
        conversation_id: i64,
        role: MessageRole,
        content: &str,
        metadata: serde_json::Value,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO messages (conversation_id, role, content, metadata) \
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(conversation_id)
        .bind(role.as_str())
        .bind(content)
        .bind(metadata.to_string())
        .execute(&self.pool)
        .await?;
        debug!(conversation_id, role = role.as_str(), "message saved");
        Ok(())
    }

    /// Update captured lead fields. Only non-empty fields overwrite.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub async fn update_lead(
        &self,
        conversation_id: i64,
        lead: &LeadInfo,
    ) -> Result<(), StoreError> {
        if lead.is_empty() {
            return Ok(());
        }
        sqlx::query(
            "UPDATE conversations SET \
               parent_name      = COALESCE(?2, parent_name), \
               parent_email     = COALESCE(?3, parent_email), \
               parent_phone     = COALESCE(?4, parent_phone), \
               program_interest = COALESCE(?5, program_interest), \
               updated_at       = datetime('now') \
             WHERE id = ?1",
        )
        .bind(conversation_id)
        .bind(lead.name.as_deref())
        .bind(lead.email.as_deref())
        .bind(lead.phone.as_deref())
        .bind(lead.program_interest.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mark a conversation escalated with a reason. A new reason overwrites
    /// the previous one; an ended conversation is left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub async fn escalate_conversation(
        &self,
        conversation_id: i64,
        reason: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE conversations SET status = 'escalated', escalation_reason = ?2, \
             updated_at = datetime('now') WHERE id = ?1 AND status != 'ended'",
        )
        .bind(conversation_id)
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mark a conversation ended. Terminal: no transition leaves `ended`.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub async fn end_conversation(&self, conversation_id: i64) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE conversations SET status = 'ended', updated_at = datetime('now') \
             WHERE id = ?1",
        )
        .bind(conversation_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// All messages for a conversation in creation order.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure or unparseable stored values.
    pub async fn message_history(
        &self,
        conversation_id: i64,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM messages WHERE conversation_id = ?1 ORDER BY created_at ASC, id ASC",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(message_from_row).collect()
    }

    /// Number of assistant turns in a conversation. The SMS channel uses
    /// this to attach the opt-in compliance suffix exactly once.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub async fn assistant_message_count(&self, conversation_id: i64) -> Result<i64, StoreError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM messages \
             WHERE conversation_id = ?1 AND role = 'assistant'",
        )
        .bind(conversation_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("n")?)
    }

    /// All active knowledge entries, ordered by category then title.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure or unparseable stored values.
    pub async fn active_knowledge(&self) -> Result<Vec<KnowledgeEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT category, title, content FROM knowledge_base \
             WHERE is_active = 1 ORDER BY category, title",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok(KnowledgeEntry {
                    category: KnowledgeCategory::parse(&row.try_get::<String, _>("category")?)?,
                    title: row.try_get("title")?,
                    content: row.try_get("content")?,
                })
            })
            .collect()
    }

    /// Insert a knowledge entry (test fixtures and seeding).
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub async fn insert_knowledge(
        &self,
        entry: &KnowledgeEntry,
        active: bool,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO knowledge_base (category, title, content, is_active) \
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(entry.category.as_str())
        .bind(&entry.title)
        .bind(&entry.content)
        .bind(i64::from(active))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    // SQLite's datetime('now') emits "YYYY-MM-DD HH:MM:SS" (UTC).
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc)))
        .unwrap_or_else(|_| Utc::now())
}

fn conversation_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Conversation, StoreError> {
    Ok(Conversation {
        id: row.try_get("id")?,
        session_id: row.try_get("session_id")?,
        channel: Channel::parse(&row.try_get::<String, _>("channel")?)?,
        parent_name: row.try_get("parent_name")?,
        parent_email: row.try_get("parent_email")?,
        parent_phone: row.try_get("parent_phone")?,
        program_interest: row.try_get("program_interest")?,
        status: ConversationStatus::parse(&row.try_get::<String, _>("status")?)?,
        escalation_reason: row.try_get("escalation_reason")?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?),
        updated_at: parse_timestamp(&row.try_get::<String, _>("updated_at")?),
    })
}

fn message_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<StoredMessage, StoreError> {
    let metadata_raw: String = row.try_get("metadata")?;
    Ok(StoredMessage {
        id: row.try_get("id")?,
        conversation_id: row.try_get("conversation_id")?,
        role: MessageRole::parse(&row.try_get::<String, _>("role")?)?,
        content: row.try_get("content")?,
        metadata: serde_json::from_str(&metadata_raw).unwrap_or(serde_json::Value::Null),
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?),
    })
}
