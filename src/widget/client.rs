//! The widget runtime without a browser: it sends visitor messages and keeps
//! the transcript of bubbles the storefront would show.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use super::{
    identity::IdentityStore,
    markup::{parse_reply, Block},
    page::{extract_product_context, PageSnapshot},
    render::to_plain_text,
};
use crate::{
    middleware_layer::api_key::API_KEY_HEADER,
    models::{
        analytics::{SessionInfo, TrackBody},
        chat::{ChatBody, ChatResponse},
        widget_config::WidgetConfig,
    },
};

/// The only thing a visitor sees when a message could not be answered.
pub const APOLOGY: &str = "Sorry, I'm having trouble connecting. Please try again.";

/// Why a widget API call failed.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// The widget API as seen from the storefront.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn post_chat(&self, body: &ChatBody) -> Result<ChatResponse, TransportError>;
    async fn fetch_config(&self) -> Result<WidgetConfig, TransportError>;
    async fn track(&self, body: &TrackBody) -> Result<(), TransportError>;
}

/// `ChatTransport` over HTTP, authenticated with a widget API key.
#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpTransport {
    /// Creates a new `HttpTransport`.
    pub fn new(
        base_url: &str,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, TransportError> {
        let response = request
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                message: error_message(&text).unwrap_or_else(|| status.to_string()),
            });
        }

        serde_json::from_str(&text).map_err(|e| TransportError::Malformed(e.to_string()))
    }
}

/// `error.message` of an error body, if there is one.
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/error/message")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[derive(serde::Deserialize)]
struct ConfigEnvelope {
    data: WidgetConfig,
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn post_chat(&self, body: &ChatBody) -> Result<ChatResponse, TransportError> {
        self.send(self.http.post(self.url("/api/widget/chat")).json(body))
            .await
    }

    async fn fetch_config(&self) -> Result<WidgetConfig, TransportError> {
        let envelope: ConfigEnvelope = self
            .send(self.http.get(self.url("/api/widget/config")))
            .await?;
        Ok(envelope.data)
    }

    async fn track(&self, body: &TrackBody) -> Result<(), TransportError> {
        let _: Value = self
            .send(self.http.post(self.url("/api/widget/track")).json(body))
            .await?;
        Ok(())
    }
}

/// One entry of the chat transcript.
#[derive(Debug, Clone, PartialEq)]
pub enum Bubble {
    User(String),
    Assistant { text: String, blocks: Vec<Block> },
    Apology,
}

impl Bubble {
    /// Renders the bubble for a terminal.
    pub fn to_plain_text(&self) -> String {
        match self {
            Bubble::User(text) => text.clone(),
            Bubble::Assistant { blocks, .. } => to_plain_text(blocks),
            Bubble::Apology => APOLOGY.to_string(),
        }
    }
}

/// A chat widget bound to one store and one visitor.
pub struct WidgetClient {
    transport: Arc<dyn ChatTransport>,
    identity: IdentityStore,
    conversation_id: Option<String>,
    messages_remaining: Option<i64>,
    transcript: Vec<Bubble>,
}

impl WidgetClient {
    /// Creates a new `WidgetClient`.
    pub fn new(transport: Arc<dyn ChatTransport>, identity: IdentityStore) -> Self {
        Self {
            transport,
            identity,
            conversation_id: None,
            messages_remaining: None,
            transcript: Vec::new(),
        }
    }

    /// Conversation the next message continues.
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    /// Quota left according to the last reply.
    pub fn messages_remaining(&self) -> Option<i64> {
        self.messages_remaining
    }

    pub fn transcript(&self) -> &[Bubble] {
        &self.transcript
    }

    fn session_info(&self, page: &PageSnapshot) -> SessionInfo {
        SessionInfo {
            session_id: self.identity.session_id(),
            visitor_id: Some(self.identity.visitor_id()),
            page_url: (!page.url.is_empty()).then(|| page.url.clone()),
            ..SessionInfo::default()
        }
    }

    /// Loads the store's widget settings and reports the widget as loaded.
    ///
    /// Neither call is allowed to keep the widget from working: a failed
    /// config fetch yields `None` and a failed track is only logged.
    pub async fn open(&mut self, page: &PageSnapshot) -> Option<WidgetConfig> {
        let config = match self.transport.fetch_config().await {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!("Failed to load widget config: {}", e);
                None
            }
        };

        let event = TrackBody {
            event_type: "widget_loaded".to_string(),
            event_data: Some(serde_json::json!({ "url": page.url })),
            session_info: self.session_info(page),
        };
        if let Err(e) = self.transport.track(&event).await {
            tracing::warn!("Failed to track widget load: {}", e);
        }

        config
    }

    /// Sends one visitor message and returns the bubble answering it.
    ///
    /// Blank input is ignored. The user bubble is added before the request
    /// goes out. Product details are attached only when the page is a
    /// product page and something could be read from it.
    pub async fn send(&mut self, input: &str, page: &PageSnapshot) -> Option<&Bubble> {
        let message = input.trim();
        if message.is_empty() {
            return None;
        }

        self.transcript.push(Bubble::User(message.to_string()));

        let body = ChatBody {
            session_id: self.identity.session_id(),
            visitor_id: Some(self.identity.visitor_id()),
            message: message.to_string(),
            conversation_id: self.conversation_id.clone(),
            product_context: extract_product_context(page),
        };

        let bubble = match self.transport.post_chat(&body).await {
            Ok(response) if response.success => {
                self.conversation_id = Some(response.data.conversation_id);
                self.messages_remaining = Some(response.meta.messages_remaining);
                let blocks = parse_reply(&response.data.message);
                Bubble::Assistant {
                    text: response.data.message,
                    blocks,
                }
            }
            Ok(_) => {
                tracing::warn!("Chat endpoint reported failure");
                Bubble::Apology
            }
            Err(e) => {
                tracing::warn!("Chat request failed: {}", e);
                Bubble::Apology
            }
        };

        self.transcript.push(bubble);
        self.transcript.last()
    }
}
