use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Uniform text for every API key failure. Never says which check failed.
pub const INVALID_API_KEY_MESSAGE: &str = "Invalid API key";
/// Text shown to the visitor when the AI responder fails.
pub const UPSTREAM_AI_MESSAGE: &str =
    "Sorry, I'm having trouble connecting right now. Please try again.";
/// Text returned when a store's message quota is exhausted.
pub const QUOTA_EXCEEDED_MESSAGE: &str = "Message limit exceeded. Please upgrade your plan.";

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A database error.
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// The connection pool could not hand out a client.
    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// A Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A row was missing an expected column.
    #[error("Missing data: {0}")]
    MissingData(String),

    /// No `X-API-Key` header on a widget request.
    #[error("API key required")]
    MissingApiKey,

    /// The key is unknown, inactive or expired.
    #[error("{}", INVALID_API_KEY_MESSAGE)]
    InvalidApiKey,

    /// A resource not found error.
    #[error("Resource not found")]
    NotFound,

    /// The store has no active credential to serve a widget with.
    #[error("Not configured: {0}")]
    NotConfigured(String),

    /// A validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The store's plan or trial has no messages left.
    #[error("{}", QUOTA_EXCEEDED_MESSAGE)]
    QuotaExceeded,

    /// A rate limit exceeded error.
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// The AI responder failed or timed out. Holds the detail for the logs.
    #[error("Upstream AI error: {0}")]
    UpstreamAi(String),

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Status code and the message that is safe to show an anonymous caller.
    pub fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }

            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }

            AppError::Redis(e) => {
                tracing::error!("Redis error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Cache error".to_string())
            }

            AppError::MissingData(column) => {
                tracing::error!("Missing column in row: {}", column);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }

            AppError::MissingApiKey => {
                tracing::warn!("Widget request without API key");
                (StatusCode::UNAUTHORIZED, "API key required".to_string())
            }

            AppError::InvalidApiKey => {
                tracing::warn!("Widget request with invalid API key");
                (StatusCode::UNAUTHORIZED, INVALID_API_KEY_MESSAGE.to_string())
            }

            AppError::NotFound => {
                tracing::debug!("Resource not found");
                (StatusCode::NOT_FOUND, "Resource not found".to_string())
            }

            AppError::NotConfigured(detail) => {
                tracing::warn!("Widget not configured: {}", detail);
                (StatusCode::NOT_FOUND, "Widget not configured".to_string())
            }

            AppError::Validation(msg) => {
                tracing::debug!("Validation error: {}", msg);
                (StatusCode::BAD_REQUEST, msg.clone())
            }

            AppError::QuotaExceeded => {
                tracing::info!("Message quota exhausted");
                (StatusCode::TOO_MANY_REQUESTS, QUOTA_EXCEEDED_MESSAGE.to_string())
            }

            AppError::RateLimitExceeded(msg) => {
                tracing::warn!("Rate limit exceeded: {}", msg);
                (StatusCode::TOO_MANY_REQUESTS, msg.clone())
            }

            AppError::UpstreamAi(detail) => {
                tracing::error!("AI responder failed: {}", detail);
                (StatusCode::BAD_GATEWAY, UPSTREAM_AI_MESSAGE.to_string())
            }

            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();

        let body = sonic_rs::to_string(&sonic_rs::json!({
            "success": false,
            "error": { "message": message }
        }))
        .unwrap_or_else(|_| {
            r#"{"success":false,"error":{"message":"Internal server error"}}"#.to_string()
        });

        (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failures_share_one_message() {
        let (status, message) = AppError::InvalidApiKey.status_and_message();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(message, INVALID_API_KEY_MESSAGE);
    }

    #[test]
    fn upstream_detail_is_not_echoed() {
        let (status, message) =
            AppError::UpstreamAi("provider said: overloaded_error id=req_123".to_string())
                .status_and_message();
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(message, UPSTREAM_AI_MESSAGE);
        assert!(!message.contains("req_123"));
    }

    #[test]
    fn quota_and_auth_are_distinct_classes() {
        let (quota, _) = AppError::QuotaExceeded.status_and_message();
        let (auth, _) = AppError::InvalidApiKey.status_and_message();
        assert_eq!(quota, StatusCode::TOO_MANY_REQUESTS);
        assert_ne!(quota, auth);
    }
}
