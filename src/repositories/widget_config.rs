use async_trait::async_trait;
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::{
    db::column,
    error::Result,
    models::widget_config::WidgetConfig,
};

/// Storage for per-store widget settings.
#[async_trait]
pub trait WidgetConfigRepository: Send + Sync {
    /// Loads the store's config, creating the default row on first access.
    async fn find_or_create(&self, store_id: Uuid) -> Result<WidgetConfig>;
}

fn row_to_config(row: &Row) -> Result<WidgetConfig> {
    Ok(WidgetConfig {
        store_id: column(row, "store_id")?,
        widget_name: column(row, "widget_name")?,
        enabled: column(row, "enabled")?,
        primary_color: column(row, "primary_color")?,
        position: column(row, "position")?,
        greeting_message: column(row, "greeting_message")?,
        placeholder_text: column(row, "placeholder_text")?,
        auto_open: column(row, "auto_open")?,
        show_branding: column(row, "show_branding")?,
        logo_url: column(row, "logo_url")?,
        company_name: column(row, "company_name")?,
    })
}

/// PostgreSQL-backed widget settings (`widget_configs`).
#[derive(Clone)]
pub struct PgWidgetConfigRepository {
    pool: Pool,
}

impl PgWidgetConfigRepository {
    /// Creates a new `PgWidgetConfigRepository`.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

const SELECT_CONFIG: &str = r#"
    SELECT store_id, widget_name, enabled, primary_color, position, greeting_message,
           placeholder_text, auto_open, show_branding, logo_url, company_name
    FROM widget_configs
    WHERE store_id = $1
"#;

#[async_trait]
impl WidgetConfigRepository for PgWidgetConfigRepository {
    async fn find_or_create(&self, store_id: Uuid) -> Result<WidgetConfig> {
        let client = self.pool.get().await?;
        let select = client.prepare_cached(SELECT_CONFIG).await?;

        if let Some(row) = client.query_opt(&select, &[&store_id]).await? {
            return row_to_config(&row);
        }

        let defaults = WidgetConfig::default_for(store_id);
        let insert = client
            .prepare_cached(
                r#"
                INSERT INTO widget_configs (
                    store_id, widget_name, enabled, primary_color, position, greeting_message,
                    placeholder_text, auto_open, show_branding
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (store_id) DO NOTHING
                "#,
            )
            .await?;
        client
            .execute(
                &insert,
                &[
                    &store_id,
                    &defaults.widget_name,
                    &defaults.enabled,
                    &defaults.primary_color,
                    &defaults.position,
                    &defaults.greeting_message,
                    &defaults.placeholder_text,
                    &defaults.auto_open,
                    &defaults.show_branding,
                ],
            )
            .await?;
        tracing::info!("✅ Default widget config created for store {}", store_id);

        let row = client.query_one(&select, &[&store_id]).await?;
        row_to_config(&row)
    }
}
