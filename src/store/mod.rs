pub mod sqlite;

use crate::cli::Args;
use async_trait::async_trait;
use chrono::{ DateTime, Utc };
use log::info;
use serde::{ Serialize, Deserialize };
use std::error::Error;
use std::sync::Arc;

pub const ROLE_USER: &str = "user";
pub const ROLE_AI: &str = "ai";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    pub id: String,
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: String,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Shape of one entry in the conversation list response.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub first_message: String,
}

/// Read-only FAQ knowledge row, consumed by prompt construction.
#[derive(Clone, Debug)]
pub struct FaqRecord {
    pub category: String,
    pub question: String,
    pub answer: String,
}

/// System of record for conversations and messages. Always authoritative;
/// the cache in front of it is advisory only.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create_conversation(
        &self,
        session_id: Option<&str>
    ) -> Result<ConversationRecord, Box<dyn Error + Send + Sync>>;

    async fn find_conversation(
        &self,
        id: &str
    ) -> Result<Option<ConversationRecord>, Box<dyn Error + Send + Sync>>;

    /// Conversation summaries ordered by creation descending. A supplied
    /// session id filters strictly to that session.
    async fn list_conversations(
        &self,
        session_id: Option<&str>
    ) -> Result<Vec<ConversationSummary>, Box<dyn Error + Send + Sync>>;

    /// Messages ordered by creation ascending. Every reader relies on this ordering.
    async fn list_messages(
        &self,
        conversation_id: &str
    ) -> Result<Vec<MessageRecord>, Box<dyn Error + Send + Sync>>;

    async fn add_message(
        &self,
        conversation_id: &str,
        role: &str,
        content: &str
    ) -> Result<MessageRecord, Box<dyn Error + Send + Sync>>;

    async fn list_faqs(&self) -> Result<Vec<FaqRecord>, Box<dyn Error + Send + Sync>>;
}

pub async fn init(args: &Args) -> Result<Arc<dyn ConversationStore>, Box<dyn Error + Send + Sync>> {
    info!("Conversation store: {}", args.database_url);
    let store = sqlite::SqliteConversationStore::connect(&args.database_url).await?;
    Ok(Arc::new(store))
}
