//! In-process implementations of every repository trait.
//!
//! Used by the test suites and by local runs without PostgreSQL. One mutex
//! guards all tables, so each method is atomic the same way a single SQL
//! statement is.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::{
        analytics::AnalyticsEvent,
        conversation::{ChatMessage, Conversation, MessageRole, NewConversation},
        credential::ApiCredential,
        store_context::StoreContext,
        subscription::{ReserveOutcome, Subscription},
        widget_config::WidgetConfig,
    },
    repositories::{
        analytics::AnalyticsRepository,
        conversation::ConversationRepository,
        credential::CredentialRepository,
        store_context::StoreContextRepository,
        subscription::{rejected, SubscriptionRepository},
        widget_config::WidgetConfigRepository,
    },
};

#[derive(Default)]
struct Tables {
    credentials: Vec<ApiCredential>,
    subscriptions: HashMap<Uuid, Subscription>,
    conversations: HashMap<Uuid, Conversation>,
    messages: Vec<ChatMessage>,
    next_message_id: i64,
    widget_configs: HashMap<Uuid, WidgetConfig>,
    events: Vec<AnalyticsEvent>,
    store_contexts: HashMap<Uuid, StoreContext>,
}

/// Toggles that make selected writes fail, for exercising best-effort paths.
#[derive(Default)]
pub struct FailureSwitches {
    /// `touch_last_used` returns an error.
    pub touch_last_used: AtomicBool,
    /// `commit_reserved` returns an error.
    pub commit: AtomicBool,
    /// Analytics inserts return an error.
    pub analytics: AtomicBool,
    /// Store context lookups return an error.
    pub store_context: AtomicBool,
}

fn injected(switch: &AtomicBool, what: &str) -> Result<()> {
    if switch.load(Ordering::SeqCst) {
        return Err(AppError::Internal(format!("injected failure: {}", what)));
    }
    Ok(())
}

/// All widget tables held in memory.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    /// Failure injection for best-effort writes.
    pub failures: FailureSwitches,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a credential as-is.
    pub async fn insert_credential(&self, credential: ApiCredential) {
        self.tables.lock().await.credentials.push(credential);
    }

    /// Inserts or replaces a store's subscription.
    pub async fn put_subscription(&self, subscription: Subscription) {
        self.tables
            .lock()
            .await
            .subscriptions
            .insert(subscription.store_id, subscription);
    }

    /// Current subscription of a store.
    pub async fn subscription(&self, store_id: Uuid) -> Option<Subscription> {
        self.tables.lock().await.subscriptions.get(&store_id).cloned()
    }

    /// Credential by key.
    pub async fn credential(&self, key: &str) -> Option<ApiCredential> {
        self.tables
            .lock()
            .await
            .credentials
            .iter()
            .find(|c| c.key == key)
            .cloned()
    }

    /// Every message of a conversation in insertion order.
    pub async fn messages(&self, conversation_id: Uuid) -> Vec<ChatMessage> {
        self.tables
            .lock()
            .await
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect()
    }

    /// Number of conversations opened for a store.
    pub async fn conversation_count(&self, store_id: Uuid) -> usize {
        self.tables
            .lock()
            .await
            .conversations
            .values()
            .filter(|c| c.store_id == store_id)
            .count()
    }

    /// Sets the catalog data of a store.
    pub async fn put_store_context(&self, store_id: Uuid, context: StoreContext) {
        self.tables
            .lock()
            .await
            .store_contexts
            .insert(store_id, context);
    }

    /// Every analytics event recorded so far.
    pub async fn events(&self) -> Vec<AnalyticsEvent> {
        self.tables.lock().await.events.clone()
    }
}

#[async_trait]
impl CredentialRepository for MemoryStore {
    async fn find_by_key(&self, key: &str) -> Result<Option<ApiCredential>> {
        Ok(self.credential(key).await)
    }

    async fn find_active_for_store(
        &self,
        store_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<ApiCredential>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .credentials
            .iter()
            .filter(|c| c.store_id == store_id && c.is_valid_at(now))
            .max_by_key(|c| c.created_at)
            .cloned())
    }

    async fn touch_last_used(&self, key: &str, at: DateTime<Utc>) -> Result<()> {
        injected(&self.failures.touch_last_used, "touch_last_used")?;
        let mut tables = self.tables.lock().await;
        for credential in tables.credentials.iter_mut().filter(|c| c.key == key) {
            credential.last_used_at = Some(at);
        }
        Ok(())
    }

    async fn upsert(&self, credential: &ApiCredential) -> Result<()> {
        let mut tables = self.tables.lock().await;
        match tables
            .credentials
            .iter_mut()
            .find(|c| c.store_id == credential.store_id && c.key_name == credential.key_name)
        {
            Some(existing) => {
                let last_used_at = existing.last_used_at;
                *existing = credential.clone();
                existing.last_used_at = last_used_at;
            }
            None => tables.credentials.push(credential.clone()),
        }
        Ok(())
    }

    async fn deactivate(&self, store_id: Uuid, key_name: &str) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        let mut matched = false;
        for credential in tables
            .credentials
            .iter_mut()
            .filter(|c| c.store_id == store_id && c.key_name == key_name)
        {
            credential.is_active = false;
            matched = true;
        }
        Ok(matched)
    }
}

#[async_trait]
impl SubscriptionRepository for MemoryStore {
    async fn find(&self, store_id: Uuid) -> Result<Option<Subscription>> {
        Ok(self.subscription(store_id).await)
    }

    async fn insert_if_absent(&self, subscription: &Subscription) -> Result<()> {
        self.tables
            .lock()
            .await
            .subscriptions
            .entry(subscription.store_id)
            .or_insert_with(|| subscription.clone());
        Ok(())
    }

    async fn try_reserve(&self, store_id: Uuid, now: DateTime<Utc>) -> Result<ReserveOutcome> {
        let mut tables = self.tables.lock().await;
        let Some(subscription) = tables.subscriptions.get_mut(&store_id) else {
            return Ok(ReserveOutcome::Missing);
        };

        if !subscription.is_active_or_in_trial(now) || subscription.remaining() <= 0 {
            return Ok(rejected(subscription, now));
        }

        let remaining = subscription.remaining();
        subscription.messages_reserved += 1;
        Ok(ReserveOutcome::Reserved { remaining })
    }

    async fn commit_reserved(&self, store_id: Uuid) -> Result<()> {
        injected(&self.failures.commit, "commit_reserved")?;
        let mut tables = self.tables.lock().await;
        if let Some(subscription) = tables.subscriptions.get_mut(&store_id) {
            subscription.messages_used += 1;
            subscription.messages_reserved = (subscription.messages_reserved - 1).max(0);
        }
        Ok(())
    }

    async fn release_reserved(&self, store_id: Uuid) -> Result<()> {
        let mut tables = self.tables.lock().await;
        if let Some(subscription) = tables.subscriptions.get_mut(&store_id) {
            subscription.messages_reserved = (subscription.messages_reserved - 1).max(0);
        }
        Ok(())
    }
}

#[async_trait]
impl ConversationRepository for MemoryStore {
    async fn find(&self, conversation_id: Uuid) -> Result<Option<Conversation>> {
        Ok(self
            .tables
            .lock()
            .await
            .conversations
            .get(&conversation_id)
            .cloned())
    }

    async fn create(&self, new: &NewConversation) -> Result<Conversation> {
        let conversation = Conversation {
            id: Uuid::new_v4(),
            store_id: new.store_id,
            session_id: new.session_id.clone(),
            visitor_id: new.visitor_id.clone(),
            created_at: Utc::now(),
        };
        self.tables
            .lock()
            .await
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn append_message(
        &self,
        conversation: &Conversation,
        role: MessageRole,
        content: &str,
        at: DateTime<Utc>,
    ) -> Result<ChatMessage> {
        let mut tables = self.tables.lock().await;
        tables.next_message_id += 1;
        let message = ChatMessage {
            id: tables.next_message_id,
            conversation_id: conversation.id,
            role,
            content: content.to_string(),
            created_at: at,
        };
        tables.messages.push(message.clone());
        Ok(message)
    }

    async fn recent_messages(&self, conversation_id: Uuid, limit: i64) -> Result<Vec<ChatMessage>> {
        let tables = self.tables.lock().await;
        let all: Vec<&ChatMessage> = tables
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .collect();
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        let skip = all.len().saturating_sub(limit);
        Ok(all.into_iter().skip(skip).cloned().collect())
    }
}

#[async_trait]
impl WidgetConfigRepository for MemoryStore {
    async fn find_or_create(&self, store_id: Uuid) -> Result<WidgetConfig> {
        Ok(self
            .tables
            .lock()
            .await
            .widget_configs
            .entry(store_id)
            .or_insert_with(|| WidgetConfig::default_for(store_id))
            .clone())
    }
}

#[async_trait]
impl AnalyticsRepository for MemoryStore {
    async fn insert(&self, event: &AnalyticsEvent) -> Result<()> {
        injected(&self.failures.analytics, "analytics insert")?;
        self.tables.lock().await.events.push(event.clone());
        Ok(())
    }
}

#[async_trait]
impl StoreContextRepository for MemoryStore {
    async fn load(&self, store_id: Uuid) -> Result<Option<StoreContext>> {
        injected(&self.failures.store_context, "store context lookup")?;
        Ok(self.tables.lock().await.store_contexts.get(&store_id).cloned())
    }
}
