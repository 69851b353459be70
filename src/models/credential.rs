use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;
use zeroize::Zeroizing;

/// Name of the credential a store gets when it is first issued one.
pub const DEFAULT_KEY_NAME: &str = "default";

/// A widget API credential owned by a store.
///
/// `key` is sent by the widget on every request and is only a lookup
/// identifier. `secret_hash` is the SHA-256 of a secret shown once at
/// issuance and never compared on the request path.
#[derive(Debug, Clone, Serialize)]
pub struct ApiCredential {
    /// The store (tenant) this credential belongs to.
    pub store_id: Uuid,
    /// Name of the credential within the store, e.g. "default".
    pub key_name: String,
    /// The public key (prefixed `sk_`).
    pub key: String,
    /// SHA-256 digest of the secret.
    #[serde(skip_serializing)]
    pub secret_hash: Vec<u8>,
    /// Deactivated credentials are kept for audit.
    pub is_active: bool,
    /// Optional hard expiry.
    pub expires_at: Option<DateTime<Utc>>,
    /// Last successful verification.
    pub last_used_at: Option<DateTime<Utc>>,
    /// The timestamp when the credential was (re)issued.
    pub created_at: DateTime<Utc>,
}

impl ApiCredential {
    /// `isActive AND (expiresAt is null OR expiresAt > now)`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.is_none_or(|expires_at| expires_at > now)
    }
}

/// A freshly issued key pair. The plaintext secret exists only here.
pub struct IssuedCredential {
    /// The public key to embed in the widget.
    pub api_key: String,
    /// The one-time secret, zeroized on drop.
    pub api_secret: Zeroizing<String>,
}
