use redis::aio::ConnectionManager;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::repositories::{
    analytics::{AnalyticsRepository, PgAnalyticsRepository},
    conversation::{ConversationRepository, PgConversationRepository},
    credential::{CredentialRepository, PgCredentialRepository},
    memory::MemoryStore,
    store_context::{PgStoreContextRepository, StoreContextRepository},
    subscription::{PgSubscriptionRepository, SubscriptionRepository},
    widget_config::{PgWidgetConfigRepository, WidgetConfigRepository},
};
use crate::services::{
    analytics::AnalyticsRecorder,
    api_key::ApiKeyVerifier,
    chat::ChatOrchestrator,
    conversation::ConversationSessions,
    quota::QuotaGuard,
    responder::{AiResponder, HttpResponder},
    widget_script::WidgetScriptRenderer,
};
use crate::throttle::{HitCounter, RedisHitCounter};

/// The record stores the services are built on.
#[derive(Clone)]
pub struct Repositories {
    pub credentials: Arc<dyn CredentialRepository>,
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub conversations: Arc<dyn ConversationRepository>,
    pub widget_configs: Arc<dyn WidgetConfigRepository>,
    pub analytics: Arc<dyn AnalyticsRepository>,
    pub store_contexts: Arc<dyn StoreContextRepository>,
}

impl Repositories {
    /// Repositories backed by PostgreSQL.
    pub fn postgres(pool: deadpool_postgres::Pool) -> Self {
        Self {
            credentials: Arc::new(PgCredentialRepository::new(pool.clone())),
            subscriptions: Arc::new(PgSubscriptionRepository::new(pool.clone())),
            conversations: Arc::new(PgConversationRepository::new(pool.clone())),
            widget_configs: Arc::new(PgWidgetConfigRepository::new(pool.clone())),
            analytics: Arc::new(PgAnalyticsRepository::new(pool.clone())),
            store_contexts: Arc::new(PgStoreContextRepository::new(pool)),
        }
    }

    /// Repositories that all share one in-memory store.
    pub fn in_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            credentials: store.clone(),
            subscriptions: store.clone(),
            conversations: store.clone(),
            widget_configs: store.clone(),
            analytics: store.clone(),
            store_contexts: store,
        }
    }
}

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration.
    pub config: Arc<Config>,
    /// Widget key lookup and lifecycle.
    pub verifier: ApiKeyVerifier,
    /// The chat pipeline.
    pub chat: ChatOrchestrator,
    /// Public widget settings.
    pub widget_configs: Arc<dyn WidgetConfigRepository>,
    /// Best-effort analytics sink.
    pub analytics: AnalyticsRecorder,
    /// Per-store widget scripts.
    pub scripts: WidgetScriptRenderer,
    /// Per-IP burst counter.
    pub hits: Arc<dyn HitCounter>,
}

impl AppState {
    /// Creates a new `AppState` connected to PostgreSQL and Redis.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub async fn new(config: &Config) -> Result<Self> {
        let db = crate::db::create_pool(&config.database_url)?;
        tracing::info!("✅ PostgreSQL Pool initialized with deadpool-postgres");

        let redis_client = redis::Client::open(config.redis_url.as_str())?;
        let redis = ConnectionManager::new(redis_client).await?;
        tracing::info!("✅ Redis Connection Manager initialized (pooled)");

        let responder = HttpResponder::new(config.ai.clone())
            .map_err(|e| AppError::Internal(format!("AI responder: {}", e)))?;
        if config.ai.api_key.is_none() {
            tracing::warn!("⚠️ AI_API_KEY is not set, chat replies will fail");
        } else {
            tracing::info!("✅ AI responder configured ({})", config.ai.model);
        }

        Ok(Self::from_parts(
            config.clone(),
            Repositories::postgres(db),
            Arc::new(responder),
            Arc::new(RedisHitCounter::new(redis)),
        ))
    }

    /// Wires the services from already built collaborators.
    pub fn from_parts(
        config: Config,
        repos: Repositories,
        responder: Arc<dyn AiResponder>,
        hits: Arc<dyn HitCounter>,
    ) -> Self {
        let verifier = ApiKeyVerifier::new(repos.credentials.clone());
        let quota = QuotaGuard::new(
            repos.subscriptions.clone(),
            config.plans.clone(),
            config.trial_days,
        );
        let chat = ChatOrchestrator::new(
            quota,
            ConversationSessions::new(repos.conversations.clone()),
            responder,
            repos.store_contexts.clone(),
            config.chat_history_limit,
            config.ai.timeout,
        );
        let scripts = WidgetScriptRenderer::new(verifier.clone(), config.api_base_url.clone());

        Self {
            config: Arc::new(config),
            verifier,
            chat,
            widget_configs: repos.widget_configs,
            analytics: AnalyticsRecorder::new(repos.analytics),
            scripts,
            hits,
        }
    }
}
