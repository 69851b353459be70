use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;

use crate::{error::AppError, state::AppState};

/// Length of the per-IP burst window.
pub const BURST_WINDOW_SECS: u64 = 60;

/// Extracts the real IP address from the request extensions.
///
/// # Returns
///
/// The IP address as a string, or "unknown" if not found.
fn extract_real_ip(req: &Request<Body>) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// A middleware that caps widget API calls per IP and minute.
///
/// The counter failing lets the request through.
pub async fn widget_burst_limit(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let ip = extract_real_ip(&req);
    let key = format!("rate_limit:widget:{}", ip);

    match state.hits.hit(&key, BURST_WINDOW_SECS).await {
        Ok(count) if count > state.config.widget_burst_per_minute => {
            return AppError::RateLimitExceeded(
                "Too many requests. Please slow down.".to_string(),
            )
            .into_response();
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!("⚠️ Burst limiter unavailable for {}: {}", ip, e);
        }
    }

    next.run(req).await
}
