use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

/// Header carrying the widget API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// The store a widget request was authenticated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WidgetTenant {
    pub store_id: Uuid,
}

/// Resolves the `X-API-Key` header to a store.
///
/// Unknown, inactive and expired keys all fail with the same response.
pub async fn require_api_key(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let key = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .ok_or(AppError::MissingApiKey)?
        .to_string();

    let store_id = state.verifier.authenticate(&key).await?;
    tracing::debug!("🔑 Widget request for store {}", store_id);

    request.extensions_mut().insert(WidgetTenant { store_id });
    Ok(next.run(request).await)
}
