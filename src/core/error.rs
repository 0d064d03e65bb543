//! Error types and handling for the explanation server.
//!
//! This module provides a unified error type [`AppError`] that wraps the
//! various failure sources and implements conversion to plain-text HTTP
//! responses (the API streams `text/plain`, so error bodies are plain text
//! as well).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Main error type for the application.
///
/// All errors in the application should be converted to this type for
/// consistent handling. Configuration errors are fatal and only occur
/// before the listener binds; everything else is scoped to one request.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors (missing API key, bad env values)
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    /// Client provided invalid or incomplete data
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Follow-up referenced a conversation id that was never created
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    /// Upstream request failed before any body bytes were produced
    #[error("Upstream request error: {0}")]
    Upstream(#[from] reqwest::Error),

    /// Upstream answered with a non-success status
    #[error("Upstream returned {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    /// Upstream body stream failed before any bytes reached the client
    #[error("Upstream stream error: {0}")]
    UpstreamStream(String),

    /// First chunk not received within the configured deadline
    #[error("First chunk not received within {timeout_secs} seconds")]
    FirstChunkTimeout { timeout_secs: u64 },

    /// Generic internal server errors with custom message
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Config(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::ConversationNotFound(id) => {
                tracing::info!(conversation_id = %id, "Follow-up for unknown conversation");
                (StatusCode::NOT_FOUND, "Conversation not found".to_string())
            }
            AppError::Upstream(e) => {
                if e.is_timeout() {
                    (StatusCode::GATEWAY_TIMEOUT, "Gateway timeout".to_string())
                } else if let Some(status) = e.status() {
                    (
                        StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY),
                        e.to_string(),
                    )
                } else {
                    (StatusCode::BAD_GATEWAY, e.to_string())
                }
            }
            AppError::UpstreamStatus { status, body } => (
                StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                body,
            ),
            AppError::UpstreamStream(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::FirstChunkTimeout { timeout_secs } => (
                StatusCode::GATEWAY_TIMEOUT,
                format!("First chunk not received within {} seconds", timeout_secs),
            ),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, message).into_response()
    }
}

/// Convenience type alias for Results using [`AppError`].
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn test_error_display() {
        let err = AppError::BadRequest("query is required".to_string());
        assert_eq!(err.to_string(), "Bad request: query is required");

        let err = AppError::Internal("test error".to_string());
        assert_eq!(err.to_string(), "Internal server error: test error");
    }

    #[test]
    fn test_bad_request_response() {
        let err = AppError::BadRequest("conversation_id is required".to_string());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_not_found_response_body() {
        let err = AppError::ConversationNotFound("missing".to_string());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"Conversation not found");
    }

    #[test]
    fn test_upstream_status_response() {
        let err = AppError::UpstreamStatus {
            status: 429,
            body: "rate limited".to_string(),
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_upstream_status_invalid_code_maps_to_bad_gateway() {
        let err = AppError::UpstreamStatus {
            status: 99,
            body: "weird".to_string(),
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_upstream_stream_error_is_bad_gateway() {
        let err = AppError::UpstreamStream("connection reset".to_string());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_first_chunk_timeout_response() {
        let err = AppError::FirstChunkTimeout { timeout_secs: 30 };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_config_error_response() {
        let err = AppError::Config(anyhow::anyhow!("CODEPARTNER_API_KEY is not set"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_from_anyhow() {
        let anyhow_err = anyhow::anyhow!("test error");
        let app_err: AppError = anyhow_err.into();
        assert!(matches!(app_err, AppError::Config(_)));
    }
}
