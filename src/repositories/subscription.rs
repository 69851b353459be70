use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::{
    db::column,
    error::{AppError, Result},
    models::subscription::{ReserveOutcome, Subscription},
};

/// Storage for per-store subscription records and their message counters.
///
/// Reservation is a single conditional update, so concurrent requests for
/// one store can never be admitted past `message_limit`.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Loads the subscription of a store.
    async fn find(&self, store_id: Uuid) -> Result<Option<Subscription>>;

    /// Inserts `subscription` unless the store already has one.
    async fn insert_if_absent(&self, subscription: &Subscription) -> Result<()>;

    /// Reserves one message slot if the subscription is active (or in trial)
    /// and `messages_used + messages_reserved < message_limit`.
    async fn try_reserve(&self, store_id: Uuid, now: DateTime<Utc>) -> Result<ReserveOutcome>;

    /// Turns one reservation into a used message.
    async fn commit_reserved(&self, store_id: Uuid) -> Result<()>;

    /// Drops one reservation without counting it.
    async fn release_reserved(&self, store_id: Uuid) -> Result<()>;
}

fn row_to_subscription(row: &Row) -> Result<Subscription> {
    let plan_name: String = column(row, "plan_name")?;
    let status: String = column(row, "status")?;

    Ok(Subscription {
        store_id: column(row, "store_id")?,
        plan_name: plan_name.parse().map_err(AppError::Internal)?,
        message_limit: column(row, "message_limit")?,
        messages_used: column(row, "messages_used")?,
        messages_reserved: column(row, "messages_reserved")?,
        status: status.parse().map_err(AppError::Internal)?,
        trial_ends_at: column(row, "trial_ends_at")?,
        current_period_end: column(row, "current_period_end")?,
    })
}

/// Rejection seen by a failed reservation: nothing left, or not active.
pub(crate) fn rejected(subscription: &Subscription, now: DateTime<Utc>) -> ReserveOutcome {
    let remaining = if subscription.is_active_or_in_trial(now) {
        subscription.remaining().max(0)
    } else {
        0
    };
    ReserveOutcome::Rejected { remaining }
}

/// PostgreSQL-backed subscriptions (`subscriptions`).
#[derive(Clone)]
pub struct PgSubscriptionRepository {
    pool: Pool,
}

impl PgSubscriptionRepository {
    /// Creates a new `PgSubscriptionRepository`.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionRepository for PgSubscriptionRepository {
    async fn find(&self, store_id: Uuid) -> Result<Option<Subscription>> {
        let client = self.pool.get().await?;
        let statement = client
            .prepare_cached(
                r#"
                SELECT store_id, plan_name, message_limit, messages_used, messages_reserved,
                       status, trial_ends_at, current_period_end
                FROM subscriptions
                WHERE store_id = $1
                "#,
            )
            .await?;
        let row = client.query_opt(&statement, &[&store_id]).await?;
        row.map(|r| row_to_subscription(&r)).transpose()
    }

    async fn insert_if_absent(&self, subscription: &Subscription) -> Result<()> {
        let client = self.pool.get().await?;
        let statement = client
            .prepare_cached(
                r#"
                INSERT INTO subscriptions (
                    store_id, plan_name, message_limit, messages_used, messages_reserved,
                    status, trial_ends_at, current_period_start, current_period_end
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), $8)
                ON CONFLICT (store_id) DO NOTHING
                "#,
            )
            .await?;
        client
            .execute(
                &statement,
                &[
                    &subscription.store_id,
                    &subscription.plan_name.as_str(),
                    &subscription.message_limit,
                    &subscription.messages_used,
                    &subscription.messages_reserved,
                    &subscription.status.as_str(),
                    &subscription.trial_ends_at,
                    &subscription.current_period_end,
                ],
            )
            .await?;
        Ok(())
    }

    async fn try_reserve(&self, store_id: Uuid, now: DateTime<Utc>) -> Result<ReserveOutcome> {
        let client = self.pool.get().await?;
        let statement = client
            .prepare_cached(
                r#"
                UPDATE subscriptions
                SET messages_reserved = messages_reserved + 1,
                    updated_at = NOW()
                WHERE store_id = $1
                  AND (status = 'active' OR (trial_ends_at IS NOT NULL AND trial_ends_at > $2))
                  AND messages_used + messages_reserved < message_limit
                RETURNING message_limit - messages_used - messages_reserved + 1 AS remaining
                "#,
            )
            .await?;

        if let Some(row) = client.query_opt(&statement, &[&store_id, &now]).await? {
            let remaining: i64 = column(&row, "remaining")?;
            return Ok(ReserveOutcome::Reserved { remaining });
        }

        drop(client);
        Ok(match self.find(store_id).await? {
            Some(subscription) => rejected(&subscription, now),
            None => ReserveOutcome::Missing,
        })
    }

    async fn commit_reserved(&self, store_id: Uuid) -> Result<()> {
        let client = self.pool.get().await?;
        let statement = client
            .prepare_cached(
                r#"
                UPDATE subscriptions
                SET messages_used = messages_used + 1,
                    messages_reserved = GREATEST(messages_reserved - 1, 0),
                    updated_at = NOW()
                WHERE store_id = $1
                "#,
            )
            .await?;
        client.execute(&statement, &[&store_id]).await?;
        Ok(())
    }

    async fn release_reserved(&self, store_id: Uuid) -> Result<()> {
        let client = self.pool.get().await?;
        let statement = client
            .prepare_cached(
                r#"
                UPDATE subscriptions
                SET messages_reserved = GREATEST(messages_reserved - 1, 0),
                    updated_at = NOW()
                WHERE store_id = $1
                "#,
            )
            .await?;
        client.execute(&statement, &[&store_id]).await?;
        Ok(())
    }
}
