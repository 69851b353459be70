use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Browser/session details attached to an analytics event.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SessionInfo {
    #[garde(length(min = 1, max = 128))]
    pub session_id: String,
    #[garde(length(max = 128))]
    pub visitor_id: Option<String>,
    #[garde(length(max = 2048))]
    pub page_url: Option<String>,
    #[garde(length(max = 2048))]
    pub referrer: Option<String>,
    #[garde(length(max = 32))]
    pub device_type: Option<String>,
    #[garde(length(max = 512))]
    pub browser: Option<String>,
}

/// One widget analytics event as stored.
#[derive(Debug, Clone)]
pub struct AnalyticsEvent {
    pub store_id: Uuid,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub session: SessionInfo,
}

/// Body of `POST /api/widget/track`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TrackBody {
    #[garde(length(min = 1, max = 64))]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub event_data: Option<serde_json::Value>,
    #[garde(dive)]
    pub session_info: SessionInfo,
}

impl TrackBody {
    /// Attributes the event to a store.
    pub fn into_event(self, store_id: Uuid) -> AnalyticsEvent {
        AnalyticsEvent {
            store_id,
            event_type: self.event_type,
            event_data: self.event_data.unwrap_or_else(|| serde_json::json!({})),
            session: self.session_info,
        }
    }
}
