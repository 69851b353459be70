use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use http::{header, HeaderName, Method};
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::{
    handlers,
    middleware_layer::{
        api_key::{require_api_key, API_KEY_HEADER},
        rate_limit::widget_burst_limit,
    },
    state::AppState,
};

/// Largest request body the widget API accepts.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Builds the widget API and the script route.
///
/// Per-peer throttling with `tower_governor` needs the peer address and is
/// added by the server binary.
pub fn widget_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(API_KEY_HEADER)])
        .max_age(Duration::from_secs(86400));

    let api_routes = Router::new()
        .route("/api/widget/config", get(handlers::widget::get_config))
        .route("/api/widget/chat", post(handlers::widget::chat))
        .route("/api/widget/track", post(handlers::widget::track))
        .route_layer(from_fn_with_state(state.clone(), require_api_key))
        .route_layer(from_fn_with_state(state.clone(), widget_burst_limit))
        .layer(cors)
        .with_state(state.clone());

    let script_routes = Router::new()
        .route(
            "/widget/{script}",
            get(handlers::widget::serve_script).options(handlers::widget::script_preflight),
        )
        .with_state(state);

    Router::new()
        .merge(api_routes)
        .merge(script_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default())
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}
