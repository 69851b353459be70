use async_trait::async_trait;
use deadpool_postgres::Pool;

use crate::{error::Result, models::analytics::AnalyticsEvent};

/// Sink for widget analytics events.
#[async_trait]
pub trait AnalyticsRepository: Send + Sync {
    /// Stores one event.
    async fn insert(&self, event: &AnalyticsEvent) -> Result<()>;
}

/// PostgreSQL-backed analytics (`widget_analytics`).
#[derive(Clone)]
pub struct PgAnalyticsRepository {
    pool: Pool,
}

impl PgAnalyticsRepository {
    /// Creates a new `PgAnalyticsRepository`.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnalyticsRepository for PgAnalyticsRepository {
    async fn insert(&self, event: &AnalyticsEvent) -> Result<()> {
        let client = self.pool.get().await?;
        let statement = client
            .prepare_cached(
                r#"
                INSERT INTO widget_analytics (
                    store_id, event_type, event_data, session_id, visitor_id,
                    page_url, referrer, device_type, browser
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .await?;
        client
            .execute(
                &statement,
                &[
                    &event.store_id,
                    &event.event_type,
                    &event.event_data,
                    &event.session.session_id,
                    &event.session.visitor_id,
                    &event.session.page_url,
                    &event.session.referrer,
                    &event.session.device_type,
                    &event.session.browser,
                ],
            )
            .await?;
        Ok(())
    }
}
