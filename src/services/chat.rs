use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::{conversation::MessageRole, product::ProductContext, store_context::StoreContext},
    repositories::store_context::StoreContextRepository,
    services::{
        conversation::ConversationSessions,
        quota::QuotaGuard,
        responder::{AiResponder, ReplyRequest},
    },
};

/// One visitor message, already attributed to a store.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub store_id: Uuid,
    pub session_id: String,
    pub visitor_id: Option<String>,
    pub message: String,
    pub conversation_id: Option<String>,
    pub product_context: Option<ProductContext>,
}

/// The reply to one visitor message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatOutcome {
    pub conversation_id: Uuid,
    pub reply_text: String,
    /// Quota left when the message was admitted, before it was counted.
    pub remaining_at_check: i64,
}

impl ChatOutcome {
    /// Quota left once this message is counted, for display.
    pub fn messages_remaining(&self) -> i64 {
        (self.remaining_at_check - 1).max(0)
    }
}

/// Runs a chat turn: admission, conversation, AI reply, metering.
#[derive(Clone)]
pub struct ChatOrchestrator {
    quota: QuotaGuard,
    sessions: ConversationSessions,
    responder: Arc<dyn AiResponder>,
    catalog: Arc<dyn StoreContextRepository>,
    history_limit: i64,
    reply_timeout: Duration,
}

impl ChatOrchestrator {
    /// Creates a new `ChatOrchestrator`.
    pub fn new(
        quota: QuotaGuard,
        sessions: ConversationSessions,
        responder: Arc<dyn AiResponder>,
        catalog: Arc<dyn StoreContextRepository>,
        history_limit: i64,
        reply_timeout: Duration,
    ) -> Self {
        Self {
            quota,
            sessions,
            responder,
            catalog,
            history_limit,
            reply_timeout,
        }
    }

    /// Handles one visitor message.
    ///
    /// The quota slot reserved at admission is committed once a reply has
    /// been stored, and released if anything before that fails. Everything
    /// after admission runs on its own task, so the reservation is settled
    /// even when the caller stops waiting.
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatOutcome> {
        if request.session_id.trim().is_empty() || request.message.trim().is_empty() {
            return Err(AppError::Validation(
                "sessionId and message are required".to_string(),
            ));
        }

        let store_id = request.store_id;
        let decision = self.quota.check_and_reserve(store_id).await?;
        if !decision.allowed {
            return Err(AppError::QuotaExceeded);
        }

        let this = self.clone();
        let turn = tokio::spawn(async move { this.settle(request).await });
        let (conversation_id, reply_text) = turn.await.map_err(|e| {
            AppError::Internal(format!("chat task for store {} failed: {}", store_id, e))
        })??;

        Ok(ChatOutcome {
            conversation_id,
            reply_text,
            remaining_at_check: decision.remaining,
        })
    }

    /// Produces the reply for an admitted message and settles its reservation.
    async fn settle(&self, request: ChatRequest) -> Result<(Uuid, String)> {
        let store_id = request.store_id;

        let reply = match self.converse(request).await {
            Ok(reply) => reply,
            Err(e) => {
                self.release(store_id).await;
                return Err(e);
            }
        };

        if let Err(e) = self.quota.commit(store_id).await {
            tracing::error!("Failed to record message usage for store {}: {}", store_id, e);
            self.release(store_id).await;
        }

        Ok(reply)
    }

    async fn release(&self, store_id: Uuid) {
        if let Err(e) = self.quota.release(store_id).await {
            tracing::error!(
                "Failed to release quota reservation for store {}: {}",
                store_id,
                e
            );
        }
    }

    /// The store's catalog for the prompt. A failed lookup only costs the
    /// reply its catalog.
    async fn store_context(&self, store_id: Uuid) -> Option<StoreContext> {
        match self.catalog.load(store_id).await {
            Ok(context) => context,
            Err(e) => {
                tracing::warn!("⚠️ Store context unavailable for store {}: {}", store_id, e);
                None
            }
        }
    }

    async fn converse(&self, request: ChatRequest) -> Result<(Uuid, String)> {
        let conversation = self
            .sessions
            .resolve(
                request.store_id,
                request.session_id.trim(),
                request.visitor_id.as_deref(),
                request.conversation_id.as_deref(),
            )
            .await?;

        let history = conversation.history(self.history_limit).await?;
        conversation
            .append_message(MessageRole::User, &request.message)
            .await?;

        let reply_request = ReplyRequest {
            history,
            message: request.message,
            product: request.product_context.filter(|p| !p.is_empty()),
            store: self.store_context(request.store_id).await,
        };

        let reply = match tokio::time::timeout(
            self.reply_timeout,
            self.responder.generate_reply(&reply_request),
        )
        .await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => return Err(AppError::UpstreamAi(e.to_string())),
            Err(_) => {
                return Err(AppError::UpstreamAi(format!(
                    "no reply within {:?}",
                    self.reply_timeout
                )));
            }
        };

        conversation
            .append_message(MessageRole::Assistant, &reply)
            .await?;
        tracing::debug!(
            "🤖 Replied in conversation {} ({} chars)",
            conversation.id(),
            reply.len()
        );

        Ok((conversation.id(), reply))
    }
}
