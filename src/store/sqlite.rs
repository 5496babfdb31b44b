use super::{
    ConversationRecord,
    ConversationStore,
    ConversationSummary,
    FaqRecord,
    MessageRecord,
};
use crate::models::chat::{ truncate_chars, FIRST_MESSAGE_PREVIEW_CHARS, NO_MESSAGES_PLACEHOLDER };
use async_trait::async_trait;
use chrono::{ DateTime, SecondsFormat, Utc };
use sqlx::Row;
use sqlx::sqlite::{ SqlitePool, SqlitePoolOptions, SqliteRow };
use std::error::Error;
use uuid::Uuid;

/// sqlx-backed conversation store. Timestamps are stored as RFC3339 text
/// with microsecond precision so lexicographic and chronological order agree.
pub struct SqliteConversationStore {
    pool: SqlitePool,
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS conversations (
        id TEXT PRIMARY KEY,
        session_id TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS messages (
        id TEXT PRIMARY KEY,
        conversation_id TEXT NOT NULL REFERENCES conversations(id),
        role TEXT NOT NULL,
        content TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_messages_conversation
        ON messages(conversation_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_conversations_session
        ON conversations(session_id, created_at)",
    "CREATE TABLE IF NOT EXISTS store_faqs (
        id TEXT PRIMARY KEY,
        category TEXT NOT NULL,
        question TEXT NOT NULL,
        answer TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
];

pub async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for ddl in SCHEMA {
        sqlx::query(ddl).execute(pool).await?;
    }
    Ok(())
}

fn now_rfc3339() -> (DateTime<Utc>, String) {
    let now = Utc::now();
    (now, now.to_rfc3339_opts(SecondsFormat::Micros, true))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, Box<dyn Error + Send + Sync>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

fn conversation_from_row(row: &SqliteRow) -> Result<ConversationRecord, Box<dyn Error + Send + Sync>> {
    Ok(ConversationRecord {
        id: row.try_get("id")?,
        session_id: row.try_get("session_id")?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
    })
}

fn message_from_row(row: &SqliteRow) -> Result<MessageRecord, Box<dyn Error + Send + Sync>> {
    Ok(MessageRecord {
        id: row.try_get("id")?,
        conversation_id: row.try_get("conversation_id")?,
        role: row.try_get("role")?,
        content: row.try_get("content")?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
    })
}

impl SqliteConversationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let pool = SqlitePoolOptions::new().max_connections(5).connect(url).await?;
        init_schema(&pool).await?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn create_conversation(
        &self,
        session_id: Option<&str>
    ) -> Result<ConversationRecord, Box<dyn Error + Send + Sync>> {
        let id = Uuid::new_v4().to_string();
        let (created_at, stamp) = now_rfc3339();
        sqlx::query("INSERT INTO conversations (id, session_id, created_at) VALUES (?1, ?2, ?3)")
            .bind(&id)
            .bind(session_id)
            .bind(&stamp)
            .execute(&self.pool).await?;
        Ok(ConversationRecord {
            id,
            session_id: session_id.map(str::to_string),
            created_at,
        })
    }

    async fn find_conversation(
        &self,
        id: &str
    ) -> Result<Option<ConversationRecord>, Box<dyn Error + Send + Sync>> {
        let row = sqlx::query("SELECT id, session_id, created_at FROM conversations WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool).await?;
        match row {
            Some(row) => Ok(Some(conversation_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_conversations(
        &self,
        session_id: Option<&str>
    ) -> Result<Vec<ConversationSummary>, Box<dyn Error + Send + Sync>> {
        let rows = sqlx::query(
            "SELECT c.id, c.created_at,
                    (SELECT m.content FROM messages m
                     WHERE m.conversation_id = c.id
                     ORDER BY m.created_at ASC LIMIT 1) AS first_content
             FROM conversations c
             WHERE (?1 IS NULL OR c.session_id = ?1)
             ORDER BY c.created_at DESC"
        )
            .bind(session_id)
            .fetch_all(&self.pool).await?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in &rows {
            let first_content: Option<String> = row.try_get("first_content")?;
            summaries.push(ConversationSummary {
                id: row.try_get("id")?,
                created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
                first_message: first_content
                    .map(|c| truncate_chars(&c, FIRST_MESSAGE_PREVIEW_CHARS))
                    .unwrap_or_else(|| NO_MESSAGES_PLACEHOLDER.to_string()),
            });
        }
        Ok(summaries)
    }

    async fn list_messages(
        &self,
        conversation_id: &str
    ) -> Result<Vec<MessageRecord>, Box<dyn Error + Send + Sync>> {
        let rows = sqlx::query(
            "SELECT id, conversation_id, role, content, created_at
             FROM messages
             WHERE conversation_id = ?1
             ORDER BY created_at ASC"
        )
            .bind(conversation_id)
            .fetch_all(&self.pool).await?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in &rows {
            messages.push(message_from_row(row)?);
        }
        Ok(messages)
    }

    async fn add_message(
        &self,
        conversation_id: &str,
        role: &str,
        content: &str
    ) -> Result<MessageRecord, Box<dyn Error + Send + Sync>> {
        let id = Uuid::new_v4().to_string();
        let (created_at, stamp) = now_rfc3339();
        sqlx::query(
            "INSERT INTO messages (id, conversation_id, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)"
        )
            .bind(&id)
            .bind(conversation_id)
            .bind(role)
            .bind(content)
            .bind(&stamp)
            .execute(&self.pool).await?;
        Ok(MessageRecord {
            id,
            conversation_id: conversation_id.to_string(),
            role: role.to_string(),
            content: content.to_string(),
            created_at,
        })
    }

    async fn list_faqs(&self) -> Result<Vec<FaqRecord>, Box<dyn Error + Send + Sync>> {
        let rows = sqlx::query(
            "SELECT category, question, answer FROM store_faqs
             ORDER BY category ASC, created_at ASC"
        )
            .fetch_all(&self.pool).await?;

        let mut faqs = Vec::with_capacity(rows.len());
        for row in &rows {
            faqs.push(FaqRecord {
                category: row.try_get("category")?,
                question: row.try_get("question")?,
                answer: row.try_get("answer")?,
            });
        }
        Ok(faqs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ ROLE_AI, ROLE_USER };

    async fn memory_store() -> SqliteConversationStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:").await
            .unwrap();
        init_schema(&pool).await.unwrap();
        SqliteConversationStore::new(pool)
    }

    #[tokio::test]
    async fn messages_come_back_in_insertion_order() {
        let store = memory_store().await;
        let conv = store.create_conversation(Some("s1")).await.unwrap();
        store.add_message(&conv.id, ROLE_USER, "first").await.unwrap();
        store.add_message(&conv.id, ROLE_AI, "second").await.unwrap();
        store.add_message(&conv.id, ROLE_USER, "third").await.unwrap();

        let messages = store.list_messages(&conv.id).await.unwrap();
        let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
        assert_eq!(messages[1].role, ROLE_AI);
    }

    #[tokio::test]
    async fn list_filters_by_session_and_orders_newest_first() {
        let store = memory_store().await;
        let a = store.create_conversation(Some("s1")).await.unwrap();
        let b = store.create_conversation(Some("s1")).await.unwrap();
        store.create_conversation(Some("s2")).await.unwrap();
        store.add_message(&a.id, ROLE_USER, "Hi").await.unwrap();

        let summaries = store.list_conversations(Some("s1")).await.unwrap();
        assert_eq!(summaries.len(), 2);
        // Newest first: b was created after a.
        assert_eq!(summaries[0].id, b.id);
        assert_eq!(summaries[0].first_message, NO_MESSAGES_PLACEHOLDER);
        assert_eq!(summaries[1].first_message, "Hi");
    }

    #[tokio::test]
    async fn list_without_session_returns_everything() {
        let store = memory_store().await;
        store.create_conversation(Some("s1")).await.unwrap();
        store.create_conversation(None).await.unwrap();

        let summaries = store.list_conversations(None).await.unwrap();
        assert_eq!(summaries.len(), 2);
    }

    #[tokio::test]
    async fn first_message_is_truncated_to_preview_length() {
        let store = memory_store().await;
        let conv = store.create_conversation(Some("s1")).await.unwrap();
        let long = "a".repeat(250);
        store.add_message(&conv.id, ROLE_USER, &long).await.unwrap();

        let summaries = store.list_conversations(Some("s1")).await.unwrap();
        assert_eq!(summaries[0].first_message.len(), FIRST_MESSAGE_PREVIEW_CHARS);
    }

    #[tokio::test]
    async fn find_conversation_misses_on_unknown_id() {
        let store = memory_store().await;
        assert!(store.find_conversation("nope").await.unwrap().is_none());
    }
}
