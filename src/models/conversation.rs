use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A widget conversation. Belongs to exactly one store.
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    /// Server-assigned id, opaque to clients.
    pub id: Uuid,
    /// The store the conversation belongs to.
    pub store_id: Uuid,
    /// Client-minted, tab-scoped session token.
    pub session_id: String,
    /// Client-minted, long-lived visitor token.
    pub visitor_id: Option<String>,
    /// The timestamp when the conversation was created.
    pub created_at: DateTime<Utc>,
}

/// Fields needed to open a conversation.
#[derive(Debug, Clone)]
pub struct NewConversation {
    pub store_id: Uuid,
    pub session_id: String,
    pub visitor_id: Option<String>,
}

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    /// The column value for this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    /// Parses a column value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            _ => None,
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An append-only chat message. `id` increases in insertion order.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub id: i64,
    pub conversation_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
