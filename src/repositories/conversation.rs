use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::{
    db::column,
    error::{AppError, Result},
    models::conversation::{ChatMessage, Conversation, MessageRole, NewConversation},
};

/// Storage for widget conversations and their messages.
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Loads a conversation by id, regardless of store.
    async fn find(&self, conversation_id: Uuid) -> Result<Option<Conversation>>;

    /// Opens a conversation and assigns its id.
    async fn create(&self, new: &NewConversation) -> Result<Conversation>;

    /// Appends a message. Messages are never updated or reordered.
    async fn append_message(
        &self,
        conversation: &Conversation,
        role: MessageRole,
        content: &str,
        at: DateTime<Utc>,
    ) -> Result<ChatMessage>;

    /// The last `limit` messages of a conversation, oldest first.
    async fn recent_messages(&self, conversation_id: Uuid, limit: i64) -> Result<Vec<ChatMessage>>;
}

fn row_to_conversation(row: &Row) -> Result<Conversation> {
    Ok(Conversation {
        id: column(row, "id")?,
        store_id: column(row, "store_id")?,
        session_id: column(row, "session_id")?,
        visitor_id: column(row, "visitor_id")?,
        created_at: column(row, "created_at")?,
    })
}

fn row_to_message(row: &Row) -> Result<ChatMessage> {
    let role: String = column(row, "role")?;
    Ok(ChatMessage {
        id: column(row, "id")?,
        conversation_id: column(row, "conversation_id")?,
        role: MessageRole::parse(&role)
            .ok_or_else(|| AppError::Internal(format!("unknown message role: {}", role)))?,
        content: column(row, "content")?,
        created_at: column(row, "created_at")?,
    })
}

/// PostgreSQL-backed conversations (`widget_conversations`, `widget_messages`).
#[derive(Clone)]
pub struct PgConversationRepository {
    pool: Pool,
}

impl PgConversationRepository {
    /// Creates a new `PgConversationRepository`.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationRepository for PgConversationRepository {
    async fn find(&self, conversation_id: Uuid) -> Result<Option<Conversation>> {
        let client = self.pool.get().await?;
        let statement = client
            .prepare_cached(
                r#"
                SELECT id, store_id, session_id, visitor_id, created_at
                FROM widget_conversations
                WHERE id = $1
                "#,
            )
            .await?;
        let row = client.query_opt(&statement, &[&conversation_id]).await?;
        row.map(|r| row_to_conversation(&r)).transpose()
    }

    async fn create(&self, new: &NewConversation) -> Result<Conversation> {
        let client = self.pool.get().await?;
        let statement = client
            .prepare_cached(
                r#"
                INSERT INTO widget_conversations (id, store_id, session_id, visitor_id, status)
                VALUES ($1, $2, $3, $4, 'active')
                RETURNING id, store_id, session_id, visitor_id, created_at
                "#,
            )
            .await?;
        let row = client
            .query_one(
                &statement,
                &[&Uuid::new_v4(), &new.store_id, &new.session_id, &new.visitor_id],
            )
            .await?;
        row_to_conversation(&row)
    }

    async fn append_message(
        &self,
        conversation: &Conversation,
        role: MessageRole,
        content: &str,
        at: DateTime<Utc>,
    ) -> Result<ChatMessage> {
        let client = self.pool.get().await?;
        let statement = client
            .prepare_cached(
                r#"
                INSERT INTO widget_messages (conversation_id, store_id, role, content, created_at)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, conversation_id, role, content, created_at
                "#,
            )
            .await?;
        let row = client
            .query_one(
                &statement,
                &[
                    &conversation.id,
                    &conversation.store_id,
                    &role.as_str(),
                    &content,
                    &at,
                ],
            )
            .await?;
        row_to_message(&row)
    }

    async fn recent_messages(&self, conversation_id: Uuid, limit: i64) -> Result<Vec<ChatMessage>> {
        let client = self.pool.get().await?;
        let statement = client
            .prepare_cached(
                r#"
                SELECT id, conversation_id, role, content, created_at
                FROM (
                    SELECT id, conversation_id, role, content, created_at
                    FROM widget_messages
                    WHERE conversation_id = $1
                    ORDER BY id DESC
                    LIMIT $2
                ) recent
                ORDER BY id ASC
                "#,
            )
            .await?;
        let rows = client.query(&statement, &[&conversation_id, &limit]).await?;
        rows.iter().map(row_to_message).collect()
    }
}
