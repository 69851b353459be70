use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

/// Long-lived storage key of the visitor id.
pub const VISITOR_ID_KEY: &str = "flash_ai_visitor_id";
/// Tab-scoped storage key of the session id.
pub const SESSION_ID_KEY: &str = "flash_ai_session_id";

/// Key/value storage the widget keeps its identifiers in.
pub trait ClientStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
}

/// Storage held in process memory.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Creates empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

impl ClientStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), value.to_string());
        }
    }
}

/// Mints and remembers the visitor and session identifiers.
///
/// The visitor id lives in long-lived storage and survives sessions. The
/// session id lives in session storage and is replaced once that is cleared.
#[derive(Clone)]
pub struct IdentityStore {
    local: Arc<dyn ClientStorage>,
    session: Arc<dyn ClientStorage>,
}

impl IdentityStore {
    /// Creates a new `IdentityStore`.
    pub fn new(local: Arc<dyn ClientStorage>, session: Arc<dyn ClientStorage>) -> Self {
        Self { local, session }
    }

    /// The visitor id, minted on first use.
    pub fn visitor_id(&self) -> String {
        get_or_mint(self.local.as_ref(), VISITOR_ID_KEY)
    }

    /// The session id, minted on first use.
    pub fn session_id(&self) -> String {
        get_or_mint(self.session.as_ref(), SESSION_ID_KEY)
    }
}

fn get_or_mint(storage: &dyn ClientStorage, key: &str) -> String {
    if let Some(existing) = storage.get(key).filter(|v| !v.trim().is_empty()) {
        return existing;
    }
    let minted = Uuid::new_v4().to_string();
    storage.set(key, &minted);
    minted
}
