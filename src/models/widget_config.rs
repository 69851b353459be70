use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Public widget settings returned to the storefront script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetConfig {
    #[serde(skip)]
    pub store_id: Uuid,
    pub widget_name: String,
    pub enabled: bool,
    pub primary_color: String,
    pub position: String,
    pub greeting_message: String,
    pub placeholder_text: String,
    pub auto_open: bool,
    pub show_branding: bool,
    pub logo_url: Option<String>,
    pub company_name: Option<String>,
}

impl WidgetConfig {
    /// The row created for a store on first access.
    pub fn default_for(store_id: Uuid) -> Self {
        Self {
            store_id,
            widget_name: "AI Assistant".to_string(),
            enabled: true,
            primary_color: "#3B82F6".to_string(),
            position: "bottom-right".to_string(),
            greeting_message: "Hi! How can I help you today?".to_string(),
            placeholder_text: "Ask me anything...".to_string(),
            auto_open: false,
            show_branding: true,
            logo_url: None,
            company_name: None,
        }
    }
}
