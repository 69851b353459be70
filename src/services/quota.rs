use std::sync::Arc;

use chrono::{DateTime, Duration, Months, Utc};
use uuid::Uuid;

use crate::{
    config::PlanTable,
    error::{AppError, Result},
    models::subscription::{PlanName, ReserveOutcome, Subscription, SubscriptionStatus},
    repositories::subscription::SubscriptionRepository,
};

/// Admission decision for one chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaDecision {
    pub allowed: bool,
    /// `messageLimit - messagesUsed` at check time, in-flight reservations
    /// counted as used.
    pub remaining: i64,
}

/// Meters chat messages against a store's subscription.
///
/// Admission reserves a slot atomically. A reserved slot is either
/// committed once a reply exists or released when none could be produced.
#[derive(Clone)]
pub struct QuotaGuard {
    subscriptions: Arc<dyn SubscriptionRepository>,
    plans: PlanTable,
    trial_days: i64,
}

impl QuotaGuard {
    /// Creates a new `QuotaGuard`.
    pub fn new(subscriptions: Arc<dyn SubscriptionRepository>, plans: PlanTable, trial_days: i64) -> Self {
        Self {
            subscriptions,
            plans,
            trial_days,
        }
    }

    /// The subscription a store gets on first access.
    pub fn default_subscription(&self, store_id: Uuid, now: DateTime<Utc>) -> Subscription {
        let plan = PlanName::Starter;
        Subscription {
            store_id,
            plan_name: plan,
            message_limit: self.plans.message_limit(plan),
            messages_used: 0,
            messages_reserved: 0,
            status: SubscriptionStatus::Active,
            trial_ends_at: Duration::try_days(self.trial_days)
                .and_then(|trial| now.checked_add_signed(trial)),
            current_period_end: now
                .checked_add_months(Months::new(1))
                .unwrap_or(now + Duration::days(30)),
        }
    }

    /// Admits or rejects one message, provisioning a default subscription
    /// when the store has none.
    pub async fn check_and_reserve(&self, store_id: Uuid) -> Result<QuotaDecision> {
        let now = Utc::now();
        let mut outcome = self.subscriptions.try_reserve(store_id, now).await?;

        if outcome == ReserveOutcome::Missing {
            tracing::info!("📦 Provisioning default subscription for store {}", store_id);
            self.subscriptions
                .insert_if_absent(&self.default_subscription(store_id, now))
                .await?;
            outcome = self.subscriptions.try_reserve(store_id, now).await?;
        }

        match outcome {
            ReserveOutcome::Reserved { remaining } => Ok(QuotaDecision {
                allowed: true,
                remaining,
            }),
            ReserveOutcome::Rejected { remaining } => {
                tracing::debug!("Store {} rejected by quota ({} remaining)", store_id, remaining);
                Ok(QuotaDecision {
                    allowed: false,
                    remaining,
                })
            }
            ReserveOutcome::Missing => Err(AppError::Internal(format!(
                "subscription for store {} vanished after provisioning",
                store_id
            ))),
        }
    }

    /// Counts a reserved message as used.
    pub async fn commit(&self, store_id: Uuid) -> Result<()> {
        self.subscriptions.commit_reserved(store_id).await
    }

    /// Gives a reserved slot back without counting it.
    pub async fn release(&self, store_id: Uuid) -> Result<()> {
        self.subscriptions.release_reserved(store_id).await
    }
}
