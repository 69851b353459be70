use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    config::AiConfig,
    models::{
        conversation::{ChatMessage, MessageRole},
        product::ProductContext,
        store_context::StoreContext,
    },
};

/// Version header the Messages API expects.
const API_VERSION: &str = "2023-06-01";
/// Product descriptions are cut to this many characters in the prompt.
const DESCRIPTION_PROMPT_CHARS: usize = 1_000;
/// Policy pages are cut to this many characters in the prompt.
const POLICY_PROMPT_CHARS: usize = 500;

/// Everything the responder sees for one turn.
#[derive(Debug, Clone)]
pub struct ReplyRequest {
    /// Earlier messages of the conversation, oldest first.
    pub history: Vec<ChatMessage>,
    /// The visitor's new message.
    pub message: String,
    /// Product the visitor is looking at, for this turn only.
    pub product: Option<ProductContext>,
    /// Catalog and policies of the store, when known.
    pub store: Option<StoreContext>,
}

/// Why a reply could not be produced. Never shown to widget visitors.
#[derive(Error, Debug)]
pub enum ResponderError {
    #[error("AI responder is not configured")]
    NotConfigured,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    Malformed(String),

    #[error("provider returned an empty reply")]
    EmptyReply,
}

/// Produces assistant text for a conversation.
#[async_trait]
pub trait AiResponder: Send + Sync {
    async fn generate_reply(&self, request: &ReplyRequest) -> Result<String, ResponderError>;
}

/// Builds the system prompt, including the reply markup contract the widget
/// renderer understands.
pub fn system_prompt(store: Option<&StoreContext>, product: Option<&ProductContext>) -> String {
    let mut prompt = String::from(
        "You are Flash AI, the shopping assistant of this online store. Help visitors \
understand products, compare options and answer questions about store policies.\n\n\
Only answer questions about this store's products, pricing, availability, shipping, \
returns, payments and ordering. Politely decline anything else, including medical \
advice and questions about other shops. Never invent product details.\n\n\
Formatting rules:\n\
- Keep answers short. Two to four sentences for simple questions.\n\
- Use **bold** for emphasis and start list lines with \"• \".\n\
- When recommending a product, write it on its own as a token: \
[PRODUCT: <title> | ₹<price> | <image url> | <product url> | <short description>]. \
The last two fields may be left out. Recommend at most three products per answer.\n",
    );

    if let Some(store) = store {
        push_store_context(&mut prompt, store);
    }

    if let Some(product) = product.filter(|p| !p.is_empty()) {
        prompt.push_str("\nCURRENT PRODUCT BEING VIEWED:\n");
        let fields = [
            ("Title", product.product_title.as_deref()),
            ("Brand", product.vendor.as_deref()),
            ("Price", product.price.as_deref()),
            ("Product ID", product.product_id.as_deref()),
        ];
        for (label, value) in fields {
            if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
                prompt.push_str(&format!("{}: {}\n", label, value));
            }
        }
        if let Some(description) = product
            .product_description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
        {
            let description: String = description.chars().take(DESCRIPTION_PROMPT_CHARS).collect();
            prompt.push_str(&format!("Description: {}\n", description));
        }
        prompt.push_str("Focus your answer on this product unless the visitor asks about something else.\n");
    }

    prompt
}

fn push_store_context(prompt: &mut String, store: &StoreContext) {
    let name = store.store_name.trim();
    if !name.is_empty() {
        prompt.push_str(&format!("\nSTORE: {}\n", name));
    }

    if !store.products.is_empty() {
        prompt.push_str("\nAVAILABLE PRODUCTS:\n");
        for (idx, product) in store.products.iter().enumerate() {
            prompt.push_str(&format!("{}. {}", idx + 1, product.title.trim()));
            if let Some(price) = product
                .price
                .as_deref()
                .map(|p| p.trim().trim_start_matches('₹'))
                .filter(|p| !p.is_empty())
            {
                prompt.push_str(&format!(" - ₹{}", price));
            }
            if let Some(short) = product
                .short_description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
            {
                prompt.push_str(&format!(" - {}", short));
            }
            prompt.push('\n');
        }
        prompt.push_str("Only recommend products from this list.\n");
    }

    if !store.collections.is_empty() {
        prompt.push_str("\nPRODUCT CATEGORIES:\n");
        for collection in &store.collections {
            prompt.push_str(&format!("- {}\n", collection.trim()));
        }
    }

    if !store.policies.is_empty() {
        prompt.push_str("\nSTORE POLICIES:\n");
        for page in &store.policies {
            let text = strip_html(&page.content);
            let mut excerpt: String = text.chars().take(POLICY_PROMPT_CHARS).collect();
            if excerpt.len() < text.len() {
                excerpt.push_str("...");
            }
            prompt.push_str(&format!("{}:\n{}\n", page.title.trim(), excerpt));
        }
    }
}

/// Drops markup tags and collapses whitespace.
fn strip_html(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => {
                in_tag = true;
                text.push(' ');
            }
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: String,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Responder backed by a Messages-style HTTP API.
#[derive(Clone)]
pub struct HttpResponder {
    client: reqwest::Client,
    config: AiConfig,
}

impl HttpResponder {
    /// Creates a new `HttpResponder`.
    pub fn new(config: AiConfig) -> Result<Self, ResponderError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ResponderError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }
}

fn wire_role(role: MessageRole) -> &'static str {
    match role {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
    }
}

#[async_trait]
impl AiResponder for HttpResponder {
    async fn generate_reply(&self, request: &ReplyRequest) -> Result<String, ResponderError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(ResponderError::NotConfigured)?;

        let mut messages: Vec<WireMessage<'_>> = request
            .history
            .iter()
            .map(|m| WireMessage {
                role: wire_role(m.role),
                content: &m.content,
            })
            .collect();
        messages.push(WireMessage {
            role: "user",
            content: &request.message,
        });

        let body = MessagesRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            system: system_prompt(request.store.as_ref(), request.product.as_ref()),
            messages,
        };

        tracing::debug!("Sending {} messages to AI responder", body.messages.len());

        let response = self
            .client
            .post(&self.config.api_url)
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| ResponderError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ResponderError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(ResponderError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: MessagesResponse =
            serde_json::from_str(&text).map_err(|e| ResponderError::Malformed(e.to_string()))?;

        let reply: String = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        if reply.trim().is_empty() {
            return Err(ResponderError::EmptyReply);
        }
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::store_context::{CatalogProduct, PolicyPage};

    #[test]
    fn prompt_carries_the_product_token_contract() {
        let prompt = system_prompt(None, None);
        assert!(prompt.contains("[PRODUCT: <title> | ₹<price> | <image url>"));
        assert!(!prompt.contains("CURRENT PRODUCT BEING VIEWED"));
    }

    #[test]
    fn product_block_lists_present_fields_only() {
        let product = ProductContext {
            product_title: Some("Rose Oil".to_string()),
            price: Some("499".to_string()),
            vendor: Some("  ".to_string()),
            ..ProductContext::default()
        };
        let prompt = system_prompt(None, Some(&product));

        assert!(prompt.contains("Title: Rose Oil\n"));
        assert!(prompt.contains("Price: 499\n"));
        assert!(!prompt.contains("Brand:"));
        assert!(!prompt.contains("Description:"));
    }

    #[test]
    fn empty_product_adds_nothing() {
        assert_eq!(
            system_prompt(None, Some(&ProductContext::default())),
            system_prompt(None, None)
        );
    }

    #[test]
    fn long_descriptions_are_cut() {
        let product = ProductContext {
            product_title: Some("Serum".to_string()),
            product_description: Some("é".repeat(5_000)),
            ..ProductContext::default()
        };
        let prompt = system_prompt(None, Some(&product));
        let line = prompt
            .lines()
            .find(|l| l.starts_with("Description: "))
            .unwrap();
        assert_eq!(line.chars().count(), "Description: ".len() + DESCRIPTION_PROMPT_CHARS);
    }

    fn catalog() -> StoreContext {
        StoreContext {
            store_name: "Glow Botanics".to_string(),
            products: vec![
                CatalogProduct {
                    title: "Rose Oil".to_string(),
                    price: Some("499.00".to_string()),
                    short_description: Some("Cold-pressed face oil".to_string()),
                },
                CatalogProduct {
                    title: "Aloe Gel".to_string(),
                    price: None,
                    short_description: None,
                },
            ],
            collections: vec!["Skincare".to_string(), "Hair".to_string()],
            policies: vec![PolicyPage {
                page_type: "returns".to_string(),
                title: "Return Policy".to_string(),
                content: "<p>Returns accepted within <b>7 days</b>.</p>".to_string(),
            }],
        }
    }

    #[test]
    fn store_catalog_is_listed_in_the_prompt() {
        let prompt = system_prompt(Some(&catalog()), None);

        assert!(prompt.contains("STORE: Glow Botanics\n"));
        assert!(prompt.contains("1. Rose Oil - ₹499.00 - Cold-pressed face oil\n"));
        assert!(prompt.contains("2. Aloe Gel\n"));
        assert!(prompt.contains("- Skincare\n- Hair\n"));
        assert!(prompt.contains("Return Policy:\nReturns accepted within 7 days .\n"));
    }

    #[test]
    fn store_section_comes_before_the_viewed_product() {
        let product = ProductContext {
            product_title: Some("Rose Oil".to_string()),
            ..ProductContext::default()
        };
        let prompt = system_prompt(Some(&catalog()), Some(&product));

        let store_at = prompt.find("AVAILABLE PRODUCTS:").unwrap();
        let product_at = prompt.find("CURRENT PRODUCT BEING VIEWED:").unwrap();
        assert!(store_at < product_at);
    }

    #[test]
    fn empty_store_context_adds_nothing() {
        assert_eq!(
            system_prompt(Some(&StoreContext::default()), None),
            system_prompt(None, None)
        );
    }

    #[test]
    fn long_policies_are_cut() {
        let mut store = StoreContext::default();
        store.policies.push(PolicyPage {
            page_type: "terms".to_string(),
            title: "Terms".to_string(),
            content: "a".repeat(2_000),
        });
        let prompt = system_prompt(Some(&store), None);

        let line = prompt.lines().find(|l| l.starts_with('a')).unwrap();
        assert_eq!(line, format!("{}...", "a".repeat(POLICY_PROMPT_CHARS)));
    }

    #[tokio::test]
    async fn unconfigured_responder_refuses() {
        let mut config = crate::config::Config::defaults("postgres://unused").ai;
        config.api_key = None;
        let responder = HttpResponder::new(config).unwrap();
        let request = ReplyRequest {
            history: Vec::new(),
            message: "hi".to_string(),
            product: None,
            store: None,
        };

        assert!(matches!(
            responder.generate_reply(&request).await,
            Err(ResponderError::NotConfigured)
        ));
    }
}
