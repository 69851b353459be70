use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::{
    db::column,
    error::Result,
    models::credential::ApiCredential,
};

/// Storage for widget API credentials.
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    /// Exact-match lookup by public key.
    async fn find_by_key(&self, key: &str) -> Result<Option<ApiCredential>>;

    /// The most recently issued credential of a store that is valid at `now`.
    async fn find_active_for_store(
        &self,
        store_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<ApiCredential>>;

    /// Records a successful verification.
    async fn touch_last_used(&self, key: &str, at: DateTime<Utc>) -> Result<()>;

    /// Inserts a credential, replacing key and secret of an existing `(store_id, key_name)`.
    async fn upsert(&self, credential: &ApiCredential) -> Result<()>;

    /// Marks a credential inactive. Returns whether a row matched.
    async fn deactivate(&self, store_id: Uuid, key_name: &str) -> Result<bool>;
}

fn row_to_credential(row: &Row) -> Result<ApiCredential> {
    Ok(ApiCredential {
        store_id: column(row, "store_id")?,
        key_name: column(row, "key_name")?,
        key: column(row, "api_key")?,
        secret_hash: column(row, "secret_hash")?,
        is_active: column(row, "is_active")?,
        expires_at: column(row, "expires_at")?,
        last_used_at: column(row, "last_used_at")?,
        created_at: column(row, "created_at")?,
    })
}

/// PostgreSQL-backed credentials (`widget_api_keys`).
#[derive(Clone)]
pub struct PgCredentialRepository {
    pool: Pool,
}

impl PgCredentialRepository {
    /// Creates a new `PgCredentialRepository`.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialRepository for PgCredentialRepository {
    async fn find_by_key(&self, key: &str) -> Result<Option<ApiCredential>> {
        let client = self.pool.get().await?;
        let statement = client
            .prepare_cached(
                r#"
                SELECT store_id, key_name, api_key, secret_hash, is_active,
                       expires_at, last_used_at, created_at
                FROM widget_api_keys
                WHERE api_key = $1
                "#,
            )
            .await?;
        let row = client.query_opt(&statement, &[&key]).await?;
        row.map(|r| row_to_credential(&r)).transpose()
    }

    async fn find_active_for_store(
        &self,
        store_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<ApiCredential>> {
        let client = self.pool.get().await?;
        let statement = client
            .prepare_cached(
                r#"
                SELECT store_id, key_name, api_key, secret_hash, is_active,
                       expires_at, last_used_at, created_at
                FROM widget_api_keys
                WHERE store_id = $1
                  AND is_active = true
                  AND (expires_at IS NULL OR expires_at > $2)
                ORDER BY created_at DESC
                LIMIT 1
                "#,
            )
            .await?;
        let row = client.query_opt(&statement, &[&store_id, &now]).await?;
        row.map(|r| row_to_credential(&r)).transpose()
    }

    async fn touch_last_used(&self, key: &str, at: DateTime<Utc>) -> Result<()> {
        let client = self.pool.get().await?;
        let statement = client
            .prepare_cached("UPDATE widget_api_keys SET last_used_at = $2 WHERE api_key = $1")
            .await?;
        client.execute(&statement, &[&key, &at]).await?;
        Ok(())
    }

    async fn upsert(&self, credential: &ApiCredential) -> Result<()> {
        let client = self.pool.get().await?;
        let statement = client
            .prepare_cached(
                r#"
                INSERT INTO widget_api_keys
                    (store_id, key_name, api_key, secret_hash, is_active, expires_at, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (store_id, key_name)
                DO UPDATE SET
                    api_key = EXCLUDED.api_key,
                    secret_hash = EXCLUDED.secret_hash,
                    is_active = EXCLUDED.is_active,
                    expires_at = EXCLUDED.expires_at,
                    created_at = EXCLUDED.created_at
                "#,
            )
            .await?;
        client
            .execute(
                &statement,
                &[
                    &credential.store_id,
                    &credential.key_name,
                    &credential.key,
                    &credential.secret_hash,
                    &credential.is_active,
                    &credential.expires_at,
                    &credential.created_at,
                ],
            )
            .await?;
        Ok(())
    }

    async fn deactivate(&self, store_id: Uuid, key_name: &str) -> Result<bool> {
        let client = self.pool.get().await?;
        let statement = client
            .prepare_cached(
                "UPDATE widget_api_keys SET is_active = false WHERE store_id = $1 AND key_name = $2",
            )
            .await?;
        let updated = client.execute(&statement, &[&store_id, &key_name]).await?;
        Ok(updated > 0)
    }
}
