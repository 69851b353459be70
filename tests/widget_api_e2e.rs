use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use askflash_widget::{
    config::Config,
    error::{INVALID_API_KEY_MESSAGE, QUOTA_EXCEEDED_MESSAGE, UPSTREAM_AI_MESSAGE},
    models::{
        conversation::MessageRole,
        credential::{ApiCredential, DEFAULT_KEY_NAME},
        store_context::{CatalogProduct, StoreContext},
        subscription::{PlanName, Subscription, SubscriptionStatus},
    },
    repositories::memory::MemoryStore,
    routes::widget_router,
    services::responder::{AiResponder, ReplyRequest, ResponderError},
    state::{AppState, Repositories},
    throttle::MemoryHitCounter,
};

/// Responder that answers from a script and remembers what it was asked.
struct ScriptedResponder {
    reply: Option<String>,
    seen: Mutex<Vec<ReplyRequest>>,
}

impl ScriptedResponder {
    fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn failing() -> Self {
        Self {
            reply: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<ReplyRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl AiResponder for ScriptedResponder {
    async fn generate_reply(&self, request: &ReplyRequest) -> Result<String, ResponderError> {
        self.seen.lock().unwrap().push(request.clone());
        match &self.reply {
            Some(reply) => Ok(reply.clone()),
            None => Err(ResponderError::Status {
                status: 529,
                body: "overloaded_error request_id=req_secret".to_string(),
            }),
        }
    }
}

struct Harness {
    app: Router,
    store: Arc<MemoryStore>,
    responder: Arc<ScriptedResponder>,
    state: AppState,
}

fn harness_with(responder: ScriptedResponder, tweak: impl FnOnce(&mut Config)) -> Harness {
    let mut config = Config::defaults("postgres://unused/askflash");
    config.api_base_url = "https://api.askflash.test".to_string();
    config.widget_burst_per_minute = 10_000;
    tweak(&mut config);

    let store = Arc::new(MemoryStore::new());
    let responder = Arc::new(responder);
    let state = AppState::from_parts(
        config,
        Repositories::in_memory(store.clone()),
        responder.clone(),
        Arc::new(MemoryHitCounter::new()),
    );

    Harness {
        app: widget_router(state.clone()),
        store,
        responder,
        state,
    }
}

fn harness() -> Harness {
    harness_with(ScriptedResponder::replying("Happy to help!"), |_| {})
}

impl Harness {
    async fn store_with_key(&self) -> (Uuid, String) {
        let store_id = Uuid::new_v4();
        let issued = self
            .state
            .verifier
            .issue(store_id, DEFAULT_KEY_NAME)
            .await
            .unwrap();
        (store_id, issued.api_key.clone())
    }

    async fn put_subscription(
        &self,
        store_id: Uuid,
        limit: i64,
        used: i64,
        status: SubscriptionStatus,
        trial_ends_at: Option<chrono::DateTime<Utc>>,
    ) {
        self.store
            .put_subscription(Subscription {
                store_id,
                plan_name: PlanName::Starter,
                message_limit: limit,
                messages_used: used,
                messages_reserved: 0,
                status,
                trial_ends_at,
                current_period_end: Utc::now() + Duration::days(30),
            })
            .await;
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec();
        (status, headers, body)
    }

    async fn post(&self, path: &str, key: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(key) = key {
            builder = builder.header("x-api-key", key);
        }
        let (status, _, bytes) = self
            .send(builder.body(Body::from(body.to_string())).unwrap())
            .await;
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn get_json(&self, path: &str, key: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().uri(path);
        if let Some(key) = key {
            builder = builder.header("x-api-key", key);
        }
        let (status, _, bytes) = self.send(builder.body(Body::empty()).unwrap()).await;
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn chat(&self, key: &str, body: Value) -> (StatusCode, Value) {
        self.post("/api/widget/chat", Some(key), body).await
    }
}

fn chat_body(message: &str) -> Value {
    json!({ "sessionId": "session-1", "visitorId": "visitor-1", "message": message })
}

#[tokio::test]
async fn serialized_chats_count_every_message() {
    let h = harness();
    let (store_id, key) = h.store_with_key().await;
    h.put_subscription(store_id, 10, 2, SubscriptionStatus::Active, None)
        .await;

    for expected_remaining in [7, 6, 5] {
        let (status, body) = h.chat(&key, chat_body("hello")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["message"], "Happy to help!");
        assert_eq!(body["meta"]["messagesRemaining"], expected_remaining);
    }

    let subscription = h.store.subscription(store_id).await.unwrap();
    assert_eq!(subscription.messages_used, 5);
    assert_eq!(subscription.messages_reserved, 0);
}

#[tokio::test]
async fn exhausted_quota_is_rejected_without_counting() {
    let h = harness();
    let (store_id, key) = h.store_with_key().await;
    h.put_subscription(store_id, 5, 5, SubscriptionStatus::Active, None)
        .await;

    let (status, body) = h.chat(&key, chat_body("hello")).await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["message"], QUOTA_EXCEEDED_MESSAGE);
    assert_eq!(h.store.subscription(store_id).await.unwrap().messages_used, 5);
    assert!(h.responder.requests().is_empty());
}

#[tokio::test]
async fn trial_admits_a_canceled_store() {
    let h = harness();
    let (store_id, key) = h.store_with_key().await;
    h.put_subscription(
        store_id,
        100,
        0,
        SubscriptionStatus::Canceled,
        Some(Utc::now() + Duration::hours(1)),
    )
    .await;

    let (status, _) = h.chat(&key, chat_body("hello")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.store.subscription(store_id).await.unwrap().messages_used, 1);
}

#[tokio::test]
async fn canceled_store_after_trial_is_rejected() {
    let h = harness();
    let (store_id, key) = h.store_with_key().await;
    h.put_subscription(
        store_id,
        100,
        0,
        SubscriptionStatus::Canceled,
        Some(Utc::now() - Duration::hours(1)),
    )
    .await;

    let (status, _) = h.chat(&key, chat_body("hello")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn first_chat_provisions_a_trial_subscription() {
    let h = harness();
    let (store_id, key) = h.store_with_key().await;

    let (status, body) = h.chat(&key, chat_body("hello")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["messagesRemaining"], 999);
    let subscription = h.store.subscription(store_id).await.unwrap();
    assert_eq!(subscription.plan_name, PlanName::Starter);
    assert_eq!(subscription.messages_used, 1);
    assert!(subscription.trial_ends_at.unwrap() > Utc::now() + Duration::days(13));
}

#[tokio::test]
async fn bad_keys_are_indistinguishable() {
    let h = harness();
    let store_id = Uuid::new_v4();

    let inactive = h.state.verifier.issue(store_id, "inactive").await.unwrap();
    h.state.verifier.deactivate(store_id, "inactive").await.unwrap();

    h.store
        .insert_credential(ApiCredential {
            store_id,
            key_name: "expired".to_string(),
            key: "sk_expired".to_string(),
            secret_hash: vec![0; 32],
            is_active: true,
            expires_at: Some(Utc::now() - Duration::minutes(1)),
            last_used_at: None,
            created_at: Utc::now() - Duration::days(60),
        })
        .await;

    let mut answers = Vec::new();
    for key in ["sk_does_not_exist", inactive.api_key.as_str(), "sk_expired"] {
        answers.push(h.chat(key, chat_body("hello")).await);
    }

    for (status, body) in &answers {
        assert_eq!(*status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["message"], INVALID_API_KEY_MESSAGE);
    }
    assert_eq!(answers[0], answers[1]);
    assert_eq!(answers[1], answers[2]);
}

#[tokio::test]
async fn missing_key_is_unauthorized() {
    let h = harness();
    let (status, body) = h.post("/api/widget/chat", None, chat_body("hello")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, _) = h.get_json("/api/widget/config", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn conversation_id_continues_the_conversation() {
    let h = harness();
    let (store_id, key) = h.store_with_key().await;

    let (_, first) = h.chat(&key, chat_body("first")).await;
    let conversation_id = first["data"]["conversationId"].as_str().unwrap().to_string();

    let mut second_body = chat_body("second");
    second_body["conversationId"] = json!(conversation_id);
    let (_, second) = h.chat(&key, second_body).await;
    assert_eq!(second["data"]["conversationId"], conversation_id.as_str());

    let messages = h
        .store
        .messages(Uuid::parse_str(&conversation_id).unwrap())
        .await;
    let transcript: Vec<(MessageRole, &str)> = messages
        .iter()
        .map(|m| (m.role, m.content.as_str()))
        .collect();
    assert_eq!(
        transcript,
        vec![
            (MessageRole::User, "first"),
            (MessageRole::Assistant, "Happy to help!"),
            (MessageRole::User, "second"),
            (MessageRole::Assistant, "Happy to help!"),
        ]
    );

    // The second turn saw the first one as history.
    let requests = h.responder.requests();
    assert_eq!(requests[1].history.len(), 2);
    assert_eq!(requests[1].message, "second");

    let (_, third) = h.chat(&key, chat_body("fresh start")).await;
    assert_ne!(third["data"]["conversationId"], conversation_id.as_str());
    assert_eq!(h.store.conversation_count(store_id).await, 2);
}

#[tokio::test]
async fn conversation_of_another_store_is_not_resumed() {
    let h = harness();
    let (_, key_a) = h.store_with_key().await;
    let (_, key_b) = h.store_with_key().await;

    let (_, first) = h.chat(&key_a, chat_body("mine")).await;
    let foreign = first["data"]["conversationId"].as_str().unwrap().to_string();

    let mut body = chat_body("sneaky");
    body["conversationId"] = json!(foreign);
    let (status, reply) = h.chat(&key_b, body).await;

    assert_eq!(status, StatusCode::OK);
    assert_ne!(reply["data"]["conversationId"], foreign.as_str());
    assert_eq!(
        h.store.messages(Uuid::parse_str(&foreign).unwrap()).await.len(),
        2
    );
}

#[tokio::test]
async fn chat_without_product_context_succeeds() {
    let h = harness();
    let (_, key) = h.store_with_key().await;

    let (status, _) = h.chat(&key, chat_body("what's on sale?")).await;
    assert_eq!(status, StatusCode::OK);

    let mut with_product = chat_body("is it vegan?");
    with_product["productContext"] = json!({
        "productTitle": "Rose Oil",
        "price": "499",
        "vendor": "Bloom"
    });
    let (status, _) = h.chat(&key, with_product).await;
    assert_eq!(status, StatusCode::OK);

    let requests = h.responder.requests();
    assert!(requests[0].product.is_none());
    let product = requests[1].product.as_ref().unwrap();
    assert_eq!(product.product_title.as_deref(), Some("Rose Oil"));
}

#[tokio::test]
async fn store_catalog_is_handed_to_the_responder() {
    let h = harness();
    let (store_id, key) = h.store_with_key().await;
    h.store
        .put_store_context(
            store_id,
            StoreContext {
                store_name: "Glow Botanics".to_string(),
                products: vec![CatalogProduct {
                    title: "Rose Oil".to_string(),
                    price: Some("499".to_string()),
                    short_description: None,
                }],
                ..StoreContext::default()
            },
        )
        .await;

    let (status, _) = h.chat(&key, chat_body("what do you sell?")).await;
    assert_eq!(status, StatusCode::OK);

    let requests = h.responder.requests();
    let store = requests[0].store.as_ref().unwrap();
    assert_eq!(store.store_name, "Glow Botanics");
    assert_eq!(store.products[0].title, "Rose Oil");
}

#[tokio::test]
async fn reply_markup_is_rendered_next_to_the_raw_text() {
    let reply = "Try this! [PRODUCT: Rose Oil | ₹499 | https://img/a.png] and [PRODUCT: Gel | ₹299 | https://img/b.png]";
    let h = harness_with(ScriptedResponder::replying(reply), |_| {});
    let (_, key) = h.store_with_key().await;

    let (status, body) = h.chat(&key, chat_body("recommend something")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["message"], reply);
    let html = body["data"]["html"].as_str().unwrap();
    assert_eq!(html.matches("flash-ai-carousel").count(), 1);
    assert_eq!(html.matches(r#"class="flash-ai-product-card""#).count(), 2);
    assert!(!html.contains("[PRODUCT:"));
}

#[tokio::test]
async fn missing_fields_and_unknown_fields_are_bad_requests() {
    let h = harness();
    let (store_id, key) = h.store_with_key().await;

    let (status, body) = h.chat(&key, json!({ "message": "hi" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "sessionId and message are required");

    let (status, _) = h.chat(&key, json!({ "sessionId": "s", "message": "   " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = h
        .chat(&key, json!({ "sessionId": "s", "message": "hi", "storeId": "x" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    assert!(h.store.subscription(store_id).await.is_none());
}

#[tokio::test]
async fn upstream_failure_is_generic_and_frees_the_slot() {
    let h = harness_with(ScriptedResponder::failing(), |_| {});
    let (store_id, key) = h.store_with_key().await;
    h.put_subscription(store_id, 10, 0, SubscriptionStatus::Active, None)
        .await;

    let (status, body) = h.chat(&key, chat_body("hello")).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["message"], UPSTREAM_AI_MESSAGE);
    assert!(!body.to_string().contains("req_secret"));

    let subscription = h.store.subscription(store_id).await.unwrap();
    assert_eq!(subscription.messages_used, 0);
    assert_eq!(subscription.messages_reserved, 0);
}

#[tokio::test]
async fn failed_usage_commit_still_returns_the_reply() {
    let h = harness();
    let (store_id, key) = h.store_with_key().await;
    h.put_subscription(store_id, 10, 0, SubscriptionStatus::Active, None)
        .await;
    h.store
        .failures
        .commit
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let (status, body) = h.chat(&key, chat_body("hello")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["message"], "Happy to help!");
    let subscription = h.store.subscription(store_id).await.unwrap();
    assert_eq!(subscription.messages_reserved, 0);
}

#[tokio::test]
async fn parallel_chats_never_exceed_the_limit() {
    let h = harness();
    let (store_id, key) = h.store_with_key().await;
    h.put_subscription(store_id, 5, 0, SubscriptionStatus::Active, None)
        .await;

    let calls = (0..20).map(|i| {
        let h = &h;
        let key = key.clone();
        async move { h.chat(&key, chat_body(&format!("message {}", i))).await.0 }
    });
    let statuses = futures::future::join_all(calls).await;

    let admitted = statuses.iter().filter(|s| **s == StatusCode::OK).count();
    let rejected = statuses
        .iter()
        .filter(|s| **s == StatusCode::TOO_MANY_REQUESTS)
        .count();
    assert_eq!(admitted, 5);
    assert_eq!(rejected, 15);
    assert_eq!(h.store.subscription(store_id).await.unwrap().messages_used, 5);
}

#[tokio::test]
async fn burst_limit_applies_before_authentication() {
    let h = harness_with(ScriptedResponder::replying("ok"), |config| {
        config.widget_burst_per_minute = 2;
    });
    let (_, key) = h.store_with_key().await;

    assert_eq!(h.get_json("/api/widget/config", Some(&key)).await.0, StatusCode::OK);
    assert_eq!(h.get_json("/api/widget/config", Some("sk_nope")).await.0, StatusCode::UNAUTHORIZED);

    let (status, body) = h.get_json("/api/widget/config", Some(&key)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_ne!(body["error"]["message"], QUOTA_EXCEEDED_MESSAGE);
}

#[tokio::test]
async fn config_returns_public_defaults() {
    let h = harness();
    let (_, key) = h.store_with_key().await;

    let (status, body) = h.get_json("/api/widget/config", Some(&key)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let data = &body["data"];
    assert_eq!(data["widgetName"], "AI Assistant");
    assert_eq!(data["enabled"], true);
    assert_eq!(data["primaryColor"], "#3B82F6");
    assert_eq!(data["position"], "bottom-right");
    assert!(data.get("storeId").is_none());
}

#[tokio::test]
async fn track_records_events_and_never_fails_the_caller() {
    let h = harness();
    let (store_id, key) = h.store_with_key().await;
    let event = json!({
        "eventType": "widget_opened",
        "eventData": { "source": "launcher" },
        "sessionInfo": { "sessionId": "session-1", "visitorId": "visitor-1", "deviceType": "mobile" }
    });

    let (status, body) = h.post("/api/widget/track", Some(&key), event.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true, "message": "Event tracked" }));

    let events = h.store.events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].store_id, store_id);
    assert_eq!(events[0].event_data["source"], "launcher");

    h.store
        .failures
        .analytics
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let (status, body) = h.post("/api/widget/track", Some(&key), event).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(h.store.events().await.len(), 1);
}

#[tokio::test]
async fn track_validates_its_body() {
    let h = harness();
    let (_, key) = h.store_with_key().await;

    let (status, _) = h
        .post(
            "/api/widget/track",
            Some(&key),
            json!({ "eventType": "", "sessionInfo": { "sessionId": "s" } }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h
        .post("/api/widget/track", Some(&key), json!({ "eventType": "x" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn script_is_served_uncached_to_any_origin() {
    let h = harness();
    let (store_id, key) = h.store_with_key().await;

    let (status, headers, body) = h
        .send(
            Request::builder()
                .uri(format!("/widget/{}.js", store_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers[header::CONTENT_TYPE],
        "application/javascript; charset=utf-8"
    );
    assert_eq!(headers[header::CACHE_CONTROL], "no-store, no-cache, must-revalidate");
    assert_eq!(headers[header::PRAGMA], "no-cache");
    assert_eq!(headers[header::EXPIRES], "0");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

    let script = String::from_utf8(body).unwrap();
    assert!(script.contains(&format!("'{}'", key)));
    assert!(script.contains("'https://api.askflash.test'"));
}

#[tokio::test]
async fn script_reflects_revocation_and_rejects_bad_ids() {
    let h = harness();
    let (store_id, _) = h.store_with_key().await;
    h.state
        .verifier
        .deactivate(store_id, DEFAULT_KEY_NAME)
        .await
        .unwrap();

    for uri in [
        format!("/widget/{}.js", store_id),
        format!("/widget/{}.js", Uuid::new_v4()),
        "/widget/not-a-uuid.js".to_string(),
        format!("/widget/{}", store_id),
    ] {
        let (status, _, _) = h
            .send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

#[tokio::test]
async fn script_preflight_allows_any_origin() {
    let h = harness();
    let (status, headers, _) = h
        .send(
            Request::builder()
                .method("OPTIONS")
                .uri(format!("/widget/{}.js", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "GET, OPTIONS");
}

#[tokio::test]
async fn api_preflight_allows_the_key_header() {
    let h = harness();
    let (status, headers, _) = h
        .send(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/widget/chat")
                .header(header::ORIGIN, "https://shop.example")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type,x-api-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert!(status.is_success());
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    let allowed = headers[header::ACCESS_CONTROL_ALLOW_HEADERS]
        .to_str()
        .unwrap()
        .to_ascii_lowercase();
    assert!(allowed.contains("x-api-key"));
}
