//! HTTP request handlers for the explanation API.

use crate::api::models::{ExplainRequest, FollowUpRequest, HealthResponse};
use crate::api::streaming::relay_text_stream;
use crate::core::logging::{generate_request_id, REQUEST_ID};
use crate::core::{AppError, RequestLog, Result};
use crate::services::registry::ConversationSession;
use crate::services::{ChatMessage, ProviderClient, SessionRegistry};
use axum::{
    extract::State,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Instruction used when `/explain` is called without a query.
pub const DEFAULT_QUERY: &str = "Please explain the above content!";

/// Shared application state.
pub struct AppState {
    pub registry: SessionRegistry,
    pub provider: ProviderClient,
    pub request_log: RequestLog,
}

/// Build the application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/explain", post(explain))
        .route("/follow_up", post(follow_up))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Compose the initial explanation prompt.
///
/// `text` is prefixed, separated by a blank line, when non-empty; an empty
/// `query` falls back to [`DEFAULT_QUERY`].
pub fn build_explain_prompt(text: &str, query: &str) -> String {
    let query = if query.is_empty() { DEFAULT_QUERY } else { query };
    if text.is_empty() {
        query.to_string()
    } else {
        format!("{}\n\n{}", text, query)
    }
}

/// Handle `POST /explain`: resolve or create the conversation session,
/// compose the prompt, and stream the completion back.
pub async fn explain(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ExplainRequest>,
) -> Result<Response> {
    let request_id = generate_request_id();

    REQUEST_ID
        .scope(request_id.clone(), async move {
            let conversation_id = payload.conversation_id.as_deref();
            let text = payload.text.unwrap_or_default();
            let query = payload.query.unwrap_or_default();

            state.request_log.record("EXPLAIN", conversation_id, &query);
            tracing::info!(
                request_id = %request_id,
                conversation_id = ?conversation_id,
                text_len = text.len(),
                "Explain request"
            );

            let session = state.registry.get_or_create(conversation_id);
            let prompt = build_explain_prompt(&text, &query);
            stream_into_session(&state, session, prompt).await
        })
        .await
}

/// Handle `POST /follow_up`: look up the existing session and stream the
/// follow-up completion into the same conversation.
pub async fn follow_up(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<FollowUpRequest>,
) -> Result<Response> {
    let request_id = generate_request_id();

    REQUEST_ID
        .scope(request_id.clone(), async move {
            let query = payload
                .query
                .filter(|q| !q.is_empty())
                .ok_or_else(|| AppError::BadRequest("query is required".to_string()))?;
            let conversation_id = payload
                .conversation_id
                .filter(|id| !id.is_empty())
                .ok_or_else(|| AppError::BadRequest("conversation_id is required".to_string()))?;

            state
                .request_log
                .record("FOLLOW_UP", Some(&conversation_id), &query);
            tracing::info!(
                request_id = %request_id,
                conversation_id = %conversation_id,
                "Follow-up request"
            );

            let session = state
                .registry
                .get(&conversation_id)
                .ok_or(AppError::ConversationNotFound(conversation_id))?;

            stream_into_session(&state, session, query).await
        })
        .await
}

/// Basic health check endpoint.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        sessions: state.registry.len(),
    })
}

/// Open the upstream stream for the session's history plus the new prompt
/// and hand the byte relay to the response.
///
/// The prompt is not recorded in the session here: the relay commits it
/// only once the upstream starts answering, so a failed attempt leaves
/// no unanswered user turn behind for a retry to duplicate.
async fn stream_into_session(
    state: &AppState,
    session: Arc<ConversationSession>,
    prompt: String,
) -> Result<Response> {
    let mut messages = session.history_snapshot();
    messages.push(ChatMessage::user(prompt.clone()));

    let upstream = state.provider.open_stream(&messages).await?;

    relay_text_stream(
        upstream,
        session,
        prompt,
        state.provider.first_chunk_timeout(),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_with_text_and_query() {
        assert_eq!(
            build_explain_prompt("def f(): pass", "what does this do?"),
            "def f(): pass\n\nwhat does this do?"
        );
    }

    #[test]
    fn test_prompt_with_empty_query_uses_default() {
        assert_eq!(
            build_explain_prompt("def f(): pass", ""),
            "def f(): pass\n\nPlease explain the above content!"
        );
    }

    #[test]
    fn test_prompt_with_query_only_has_no_leading_blank_lines() {
        assert_eq!(build_explain_prompt("", "what is a monad?"), "what is a monad?");
    }

    #[test]
    fn test_prompt_with_nothing_is_default_alone() {
        assert_eq!(build_explain_prompt("", ""), DEFAULT_QUERY);
    }
}
