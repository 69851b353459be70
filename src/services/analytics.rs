use std::sync::Arc;

use crate::{models::analytics::AnalyticsEvent, repositories::analytics::AnalyticsRepository};

/// Best-effort sink for widget analytics events.
#[derive(Clone)]
pub struct AnalyticsRecorder {
    events: Arc<dyn AnalyticsRepository>,
}

impl AnalyticsRecorder {
    /// Creates a new `AnalyticsRecorder`.
    pub fn new(events: Arc<dyn AnalyticsRepository>) -> Self {
        Self { events }
    }

    /// Stores an event. Failures are logged, never returned.
    pub async fn record(&self, event: &AnalyticsEvent) {
        if let Err(e) = self.events.insert(event).await {
            tracing::warn!(
                "Failed to track '{}' event for store {}: {}",
                event.event_type,
                event.store_id,
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::analytics::SessionInfo;
    use crate::repositories::memory::MemoryStore;
    use std::sync::atomic::Ordering;
    use uuid::Uuid;

    fn event() -> AnalyticsEvent {
        AnalyticsEvent {
            store_id: Uuid::new_v4(),
            event_type: "widget_opened".to_string(),
            event_data: serde_json::json!({ "source": "button" }),
            session: SessionInfo {
                session_id: "s".to_string(),
                ..SessionInfo::default()
            },
        }
    }

    #[tokio::test]
    async fn records_events() {
        let store = Arc::new(MemoryStore::new());
        AnalyticsRecorder::new(store.clone()).record(&event()).await;
        assert_eq!(store.events().await.len(), 1);
    }

    #[tokio::test]
    async fn swallows_insert_failures() {
        let store = Arc::new(MemoryStore::new());
        store.failures.analytics.store(true, Ordering::SeqCst);
        AnalyticsRecorder::new(store.clone()).record(&event()).await;
        assert!(store.events().await.is_empty());
    }
}
