use std::sync::Arc;

use chrono::Utc;
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use uuid::Uuid;
use zeroize::{Zeroize, Zeroizing};

use crate::{
    error::{AppError, Result},
    models::credential::{ApiCredential, IssuedCredential},
    repositories::credential::CredentialRepository,
};

/// Prefix of every public widget key.
pub const KEY_PREFIX: &str = "sk_";
/// Random bytes behind the public key.
const KEY_BYTES: usize = 24;
/// Random bytes behind the one-time secret.
const SECRET_BYTES: usize = 48;
/// Keys longer than this are rejected without a lookup.
const MAX_KEY_LEN: usize = 256;

/// Result of looking up a widget key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyVerification {
    /// The owning store, only set when `valid`.
    pub store_id: Option<Uuid>,
    pub valid: bool,
}

impl KeyVerification {
    fn invalid() -> Self {
        Self {
            store_id: None,
            valid: false,
        }
    }
}

/// Maps widget keys to stores and manages their lifecycle.
#[derive(Clone)]
pub struct ApiKeyVerifier {
    credentials: Arc<dyn CredentialRepository>,
}

impl ApiKeyVerifier {
    /// Creates a new `ApiKeyVerifier`.
    pub fn new(credentials: Arc<dyn CredentialRepository>) -> Self {
        Self { credentials }
    }

    /// Looks up `key` and checks that it is active and unexpired.
    ///
    /// On success `lastUsedAt` is touched. A failed touch is logged and
    /// does not change the outcome.
    pub async fn verify(&self, key: &str) -> Result<KeyVerification> {
        if key.is_empty() || key.len() > MAX_KEY_LEN {
            return Ok(KeyVerification::invalid());
        }

        let now = Utc::now();
        let credential = match self.credentials.find_by_key(key).await? {
            Some(credential) if credential.is_valid_at(now) => credential,
            _ => return Ok(KeyVerification::invalid()),
        };

        if let Err(e) = self.credentials.touch_last_used(key, now).await {
            tracing::warn!("Failed to record key usage for store {}: {}", credential.store_id, e);
        }

        Ok(KeyVerification {
            store_id: Some(credential.store_id),
            valid: true,
        })
    }

    /// Like [`verify`](Self::verify), but turns an invalid key into
    /// [`AppError::InvalidApiKey`].
    pub async fn authenticate(&self, key: &str) -> Result<Uuid> {
        match self.verify(key).await? {
            KeyVerification {
                store_id: Some(store_id),
                valid: true,
            } => Ok(store_id),
            _ => Err(AppError::InvalidApiKey),
        }
    }

    /// Issues (or rotates) the credential `key_name` of a store.
    ///
    /// The returned secret is the only copy of its plaintext.
    pub async fn issue(&self, store_id: Uuid, key_name: &str) -> Result<IssuedCredential> {
        let key_name = key_name.trim();
        if key_name.is_empty() || key_name.len() > 64 {
            return Err(AppError::Validation(
                "Key name must be between 1 and 64 characters".to_string(),
            ));
        }

        let api_key = format!("{}{}", KEY_PREFIX, random_hex(KEY_BYTES));
        let api_secret = Zeroizing::new(random_hex(SECRET_BYTES));
        let secret_hash = Sha256::digest(api_secret.as_bytes()).to_vec();

        let credential = ApiCredential {
            store_id,
            key_name: key_name.to_string(),
            key: api_key.clone(),
            secret_hash,
            is_active: true,
            expires_at: None,
            last_used_at: None,
            created_at: Utc::now(),
        };
        self.credentials.upsert(&credential).await?;
        tracing::info!("🔑 Issued widget key '{}' for store {}", key_name, store_id);

        Ok(IssuedCredential {
            api_key,
            api_secret,
        })
    }

    /// Deactivates a credential. Returns whether it existed.
    pub async fn deactivate(&self, store_id: Uuid, key_name: &str) -> Result<bool> {
        let found = self.credentials.deactivate(store_id, key_name).await?;
        if found {
            tracing::info!("🔒 Deactivated widget key '{}' for store {}", key_name, store_id);
        }
        Ok(found)
    }

    /// The credential a served widget script embeds.
    pub async fn active_credential(&self, store_id: Uuid) -> Result<Option<ApiCredential>> {
        self.credentials.find_active_for_store(store_id, Utc::now()).await
    }
}

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    let encoded = hex::encode(&bytes);
    bytes.zeroize();
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::credential::DEFAULT_KEY_NAME;
    use crate::repositories::memory::MemoryStore;
    use chrono::Duration;
    use std::sync::atomic::Ordering;

    fn verifier() -> (Arc<MemoryStore>, ApiKeyVerifier) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), ApiKeyVerifier::new(store))
    }

    #[tokio::test]
    async fn issued_key_verifies_and_touches_last_used() {
        let (store, verifier) = verifier();
        let store_id = Uuid::new_v4();
        let issued = verifier.issue(store_id, DEFAULT_KEY_NAME).await.unwrap();

        assert!(issued.api_key.starts_with(KEY_PREFIX));
        assert_eq!(issued.api_key.len(), KEY_PREFIX.len() + KEY_BYTES * 2);
        assert_eq!(issued.api_secret.len(), SECRET_BYTES * 2);

        let verification = verifier.verify(&issued.api_key).await.unwrap();
        assert_eq!(verification.store_id, Some(store_id));
        assert!(verification.valid);

        let stored = store.credential(&issued.api_key).await.unwrap();
        assert!(stored.last_used_at.is_some());
        assert_eq!(
            stored.secret_hash,
            Sha256::digest(issued.api_secret.as_bytes()).to_vec()
        );
    }

    #[tokio::test]
    async fn reissuing_rotates_the_key() {
        let (_, verifier) = verifier();
        let store_id = Uuid::new_v4();
        let first = verifier.issue(store_id, DEFAULT_KEY_NAME).await.unwrap();
        let second = verifier.issue(store_id, DEFAULT_KEY_NAME).await.unwrap();

        assert_ne!(first.api_key, second.api_key);
        assert!(!verifier.verify(&first.api_key).await.unwrap().valid);
        assert!(verifier.verify(&second.api_key).await.unwrap().valid);
    }

    #[tokio::test]
    async fn missing_inactive_and_expired_keys_look_the_same() {
        let (store, verifier) = verifier();
        let store_id = Uuid::new_v4();

        let inactive = verifier.issue(store_id, "inactive").await.unwrap();
        verifier.deactivate(store_id, "inactive").await.unwrap();

        store
            .insert_credential(ApiCredential {
                store_id,
                key_name: "expired".to_string(),
                key: "sk_expired".to_string(),
                secret_hash: vec![0; 32],
                is_active: true,
                expires_at: Some(Utc::now() - Duration::minutes(1)),
                last_used_at: None,
                created_at: Utc::now(),
            })
            .await;

        for key in ["sk_missing", inactive.api_key.as_str(), "sk_expired"] {
            assert_eq!(verifier.verify(key).await.unwrap(), KeyVerification::invalid());
            assert!(matches!(
                verifier.authenticate(key).await,
                Err(AppError::InvalidApiKey)
            ));
        }
    }

    #[tokio::test]
    async fn failed_touch_does_not_fail_verification() {
        let (store, verifier) = verifier();
        let issued = verifier.issue(Uuid::new_v4(), DEFAULT_KEY_NAME).await.unwrap();
        store.failures.touch_last_used.store(true, Ordering::SeqCst);

        assert!(verifier.verify(&issued.api_key).await.unwrap().valid);
    }

    #[tokio::test]
    async fn oversized_keys_are_rejected() {
        let (_, verifier) = verifier();
        let key = format!("sk_{}", "a".repeat(MAX_KEY_LEN));
        assert!(!verifier.verify(&key).await.unwrap().valid);
        assert!(!verifier.verify("").await.unwrap().valid);
    }
}
