use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    error::Result,
    models::conversation::{ChatMessage, Conversation, MessageRole, NewConversation},
    repositories::conversation::ConversationRepository,
};

/// Resolves the conversation a chat turn belongs to.
#[derive(Clone)]
pub struct ConversationSessions {
    conversations: Arc<dyn ConversationRepository>,
}

/// A resolved conversation that messages can be appended to.
pub struct ConversationHandle {
    conversations: Arc<dyn ConversationRepository>,
    conversation: Conversation,
    resumed: bool,
}

impl ConversationSessions {
    /// Creates a new `ConversationSessions`.
    pub fn new(conversations: Arc<dyn ConversationRepository>) -> Self {
        Self { conversations }
    }

    /// Reuses `conversation_id` when it names a conversation of `store_id`,
    /// otherwise opens a new one for `(store_id, session_id, visitor_id)`.
    ///
    /// Ids that do not parse, are unknown, or belong to another store are
    /// treated as absent.
    pub async fn resolve(
        &self,
        store_id: Uuid,
        session_id: &str,
        visitor_id: Option<&str>,
        conversation_id: Option<&str>,
    ) -> Result<ConversationHandle> {
        if let Some(id) = conversation_id.and_then(|raw| Uuid::parse_str(raw.trim()).ok()) {
            match self.conversations.find(id).await? {
                Some(conversation) if conversation.store_id == store_id => {
                    return Ok(self.handle(conversation, true));
                }
                Some(_) => {
                    tracing::warn!("Conversation {} requested by foreign store {}", id, store_id);
                }
                None => tracing::debug!("Stale conversation id {}, starting a new one", id),
            }
        }

        let conversation = self
            .conversations
            .create(&NewConversation {
                store_id,
                session_id: session_id.to_string(),
                visitor_id: visitor_id.map(str::to_string),
            })
            .await?;
        tracing::debug!("💬 New conversation {} for store {}", conversation.id, store_id);

        Ok(self.handle(conversation, false))
    }

    fn handle(&self, conversation: Conversation, resumed: bool) -> ConversationHandle {
        ConversationHandle {
            conversations: self.conversations.clone(),
            conversation,
            resumed,
        }
    }
}

impl ConversationHandle {
    /// The server-assigned conversation id.
    pub fn id(&self) -> Uuid {
        self.conversation.id
    }

    /// Whether the caller's `conversationId` was reused.
    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    /// Appends a message after every earlier one.
    pub async fn append_message(&self, role: MessageRole, content: &str) -> Result<ChatMessage> {
        self.conversations
            .append_message(&self.conversation, role, content, Utc::now())
            .await
    }

    /// The last `limit` messages, oldest first.
    pub async fn history(&self, limit: i64) -> Result<Vec<ChatMessage>> {
        if limit <= 0 {
            return Ok(Vec::new());
        }
        self.conversations
            .recent_messages(self.conversation.id, limit)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::memory::MemoryStore;

    #[tokio::test]
    async fn resumes_only_conversations_of_the_same_store() {
        let store = Arc::new(MemoryStore::new());
        let sessions = ConversationSessions::new(store.clone());
        let store_a = Uuid::new_v4();
        let store_b = Uuid::new_v4();

        let first = sessions.resolve(store_a, "s1", Some("v1"), None).await.unwrap();
        assert!(!first.is_resumed());
        let id = first.id().to_string();

        let again = sessions.resolve(store_a, "s1", Some("v1"), Some(&id)).await.unwrap();
        assert!(again.is_resumed());
        assert_eq!(again.id(), first.id());

        let foreign = sessions.resolve(store_b, "s1", None, Some(&id)).await.unwrap();
        assert!(!foreign.is_resumed());
        assert_ne!(foreign.id(), first.id());
    }

    #[tokio::test]
    async fn garbage_and_unknown_ids_open_new_conversations() {
        let store = Arc::new(MemoryStore::new());
        let sessions = ConversationSessions::new(store.clone());
        let store_id = Uuid::new_v4();
        let unknown = Uuid::new_v4().to_string();

        for raw in ["not-a-uuid", "", unknown.as_str()] {
            let handle = sessions.resolve(store_id, "s", None, Some(raw)).await.unwrap();
            assert!(!handle.is_resumed());
        }
        assert_eq!(store.conversation_count(store_id).await, 3);
    }

    #[tokio::test]
    async fn appends_in_call_order() {
        let store = Arc::new(MemoryStore::new());
        let sessions = ConversationSessions::new(store.clone());
        let handle = sessions.resolve(Uuid::new_v4(), "s", None, None).await.unwrap();

        handle.append_message(MessageRole::User, "hi").await.unwrap();
        handle.append_message(MessageRole::Assistant, "hello").await.unwrap();
        handle.append_message(MessageRole::User, "hi").await.unwrap();

        let history = handle.history(10).await.unwrap();
        let turns: Vec<(MessageRole, &str)> =
            history.iter().map(|m| (m.role, m.content.as_str())).collect();
        assert_eq!(
            turns,
            vec![
                (MessageRole::User, "hi"),
                (MessageRole::Assistant, "hello"),
                (MessageRole::User, "hi"),
            ]
        );
        assert!(handle.history(0).await.unwrap().is_empty());
    }
}
