use async_trait::async_trait;
use deadpool_postgres::Pool;
use uuid::Uuid;

use crate::{
    db::column,
    error::Result,
    models::store_context::{CatalogProduct, PolicyPage, StoreContext},
};

/// Read access to the catalog data extracted from a store.
#[async_trait]
pub trait StoreContextRepository: Send + Sync {
    /// The store's name, newest active products, collections and policy
    /// pages. `None` when the store is unknown.
    async fn load(&self, store_id: Uuid) -> Result<Option<StoreContext>>;
}

const PRODUCT_LIMIT: i64 = 20;
const COLLECTION_LIMIT: i64 = 10;
const POLICY_LIMIT: i64 = 10;

/// PostgreSQL-backed store context (`stores`, `extracted_products`,
/// `extracted_collections`, `extracted_pages`).
#[derive(Clone)]
pub struct PgStoreContextRepository {
    pool: Pool,
}

impl PgStoreContextRepository {
    /// Creates a new `PgStoreContextRepository`.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StoreContextRepository for PgStoreContextRepository {
    async fn load(&self, store_id: Uuid) -> Result<Option<StoreContext>> {
        let client = self.pool.get().await?;

        let store = client
            .prepare_cached(
                "SELECT COALESCE(NULLIF(store_name, ''), domain) AS name FROM stores WHERE id = $1",
            )
            .await?;
        let Some(row) = client.query_opt(&store, &[&store_id]).await? else {
            return Ok(None);
        };
        let store_name: Option<String> = column(&row, "name")?;

        let products = client
            .prepare_cached(
                r#"
                SELECT title, price::text AS price, short_description
                FROM extracted_products
                WHERE store_id = $1 AND status = 'active'
                ORDER BY created_at DESC
                LIMIT $2
                "#,
            )
            .await?;
        let products = client
            .query(&products, &[&store_id, &PRODUCT_LIMIT])
            .await?
            .iter()
            .map(|row| {
                Ok(CatalogProduct {
                    title: column(row, "title")?,
                    price: column(row, "price")?,
                    short_description: column(row, "short_description")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let collections = client
            .prepare_cached(
                "SELECT title FROM extracted_collections WHERE store_id = $1 ORDER BY title LIMIT $2",
            )
            .await?;
        let collections = client
            .query(&collections, &[&store_id, &COLLECTION_LIMIT])
            .await?
            .iter()
            .map(|row| column(row, "title"))
            .collect::<Result<Vec<String>>>()?;

        let policies = client
            .prepare_cached(
                r#"
                SELECT page_type, title, content
                FROM extracted_pages
                WHERE store_id = $1
                  AND page_type IN ('terms', 'privacy', 'shipping', 'returns', 'refund')
                LIMIT $2
                "#,
            )
            .await?;
        let policies = client
            .query(&policies, &[&store_id, &POLICY_LIMIT])
            .await?
            .iter()
            .map(|row| {
                let content: Option<String> = column(row, "content")?;
                Ok(PolicyPage {
                    page_type: column(row, "page_type")?,
                    title: column(row, "title")?,
                    content: content.unwrap_or_default(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(StoreContext {
            store_name: store_name.unwrap_or_default(),
            products,
            collections,
            policies,
        }))
    }
}
