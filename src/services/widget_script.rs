use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    services::api_key::ApiKeyVerifier,
};

/// The storefront runtime, with `{{API_BASE_URL}}` and `{{API_KEY}}` left open.
const TEMPLATE: &str = include_str!("../templates/widget-template.js");
const BASE_URL_PLACEHOLDER: &str = "{{API_BASE_URL}}";
const API_KEY_PLACEHOLDER: &str = "{{API_KEY}}";

/// Produces the per-store widget script.
#[derive(Clone)]
pub struct WidgetScriptRenderer {
    verifier: ApiKeyVerifier,
    api_base_url: String,
}

impl WidgetScriptRenderer {
    /// Creates a new `WidgetScriptRenderer`.
    pub fn new(verifier: ApiKeyVerifier, api_base_url: impl Into<String>) -> Self {
        Self {
            verifier,
            api_base_url: api_base_url.into(),
        }
    }

    /// Renders the script for `store_id` with its active key baked in.
    pub async fn render(&self, store_id: Uuid) -> Result<String> {
        let credential = self
            .verifier
            .active_credential(store_id)
            .await?
            .ok_or_else(|| {
                AppError::NotConfigured(format!("store {} has no active widget key", store_id))
            })?;

        Ok(fill_template(TEMPLATE, &self.api_base_url, &credential.key))
    }
}

fn fill_template(template: &str, api_base_url: &str, api_key: &str) -> String {
    template
        .replace(BASE_URL_PLACEHOLDER, &escape_js_string(api_base_url))
        .replace(API_KEY_PLACEHOLDER, &escape_js_string(api_key))
}

/// Escapes text for the inside of a single-quoted JavaScript string that
/// itself sits in a `<script>` element.
fn escape_js_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '<' => out.push_str("\\x3C"),
            '\u{2028}' | '\u{2029}' => out.push_str(&format!("\\u{:04x}", c as u32)),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}
