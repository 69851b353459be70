use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    middleware_layer::api_key::WidgetTenant,
    models::{
        analytics::TrackBody,
        chat::{ChatBody, ChatReplyData, ChatReplyMeta, ChatResponse},
        widget_config::WidgetConfig,
    },
    services::chat::ChatRequest,
    state::AppState,
    validation::json::ValidatedJson,
    widget::{markup, render},
};

/// `{ success, data }` envelope of widget API responses.
#[derive(Serialize)]
struct DataResponse<T> {
    success: bool,
    data: T,
}

/// The response payload of the track endpoint.
#[derive(Serialize)]
struct TrackResponse {
    success: bool,
    message: &'static str,
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Result<Response> {
    let body = sonic_rs::to_string(body)
        .map_err(|e| AppError::Internal(format!("Failed to serialize response: {}", e)))?;
    Ok((status, [(header::CONTENT_TYPE, "application/json")], body).into_response())
}

/// Returns the public widget settings of the calling store.
pub async fn get_config(
    State(state): State<AppState>,
    Extension(tenant): Extension<WidgetTenant>,
) -> Result<Response> {
    let config: WidgetConfig = state.widget_configs.find_or_create(tenant.store_id).await?;
    json_response(
        StatusCode::OK,
        &DataResponse {
            success: true,
            data: config,
        },
    )
}

/// Answers one visitor message.
pub async fn chat(
    State(state): State<AppState>,
    Extension(tenant): Extension<WidgetTenant>,
    ValidatedJson(payload): ValidatedJson<ChatBody>,
) -> Result<Response> {
    tracing::debug!(
        "💬 Chat message for store {} (session {})",
        tenant.store_id,
        payload.session_id
    );

    let outcome = state
        .chat
        .chat(ChatRequest {
            store_id: tenant.store_id,
            session_id: payload.session_id,
            visitor_id: payload.visitor_id,
            message: payload.message,
            conversation_id: payload.conversation_id,
            product_context: payload.product_context.filter(|p| !p.is_empty()),
        })
        .await?;

    let html = render::to_html(&markup::parse_reply(&outcome.reply_text));
    let messages_remaining = outcome.messages_remaining();

    json_response(
        StatusCode::OK,
        &ChatResponse {
            success: true,
            data: ChatReplyData {
                conversation_id: outcome.conversation_id.to_string(),
                message: outcome.reply_text,
                html: Some(html),
            },
            meta: ChatReplyMeta { messages_remaining },
        },
    )
}

/// Records an analytics event. Storage failures never reach the caller.
pub async fn track(
    State(state): State<AppState>,
    Extension(tenant): Extension<WidgetTenant>,
    ValidatedJson(payload): ValidatedJson<TrackBody>,
) -> Result<Response> {
    let event = payload.into_event(tenant.store_id);
    state.analytics.record(&event).await;

    json_response(
        StatusCode::OK,
        &TrackResponse {
            success: true,
            message: "Event tracked",
        },
    )
}

/// Serves `/widget/{storeId}.js`.
pub async fn serve_script(
    State(state): State<AppState>,
    Path(script): Path<String>,
) -> Result<Response> {
    let store_id = script
        .strip_suffix(".js")
        .and_then(|id| Uuid::parse_str(id).ok())
        .ok_or(AppError::NotFound)?;

    let body = state.scripts.render(store_id).await?;
    tracing::debug!("📦 Served widget script for store {}", store_id);

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/javascript; charset=utf-8"),
            (header::CACHE_CONTROL, "no-store, no-cache, must-revalidate"),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "0"),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        ],
        body,
    )
        .into_response())
}

/// CORS preflight for the widget script.
pub async fn script_preflight() -> Response {
    (
        StatusCode::NO_CONTENT,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "GET, OPTIONS"),
        ],
    )
        .into_response()
}
