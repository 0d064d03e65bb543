//! Request and response types for the HTTP surface.

use serde::{Deserialize, Serialize};

/// Body of `POST /explain`. Every field is optional; an absent
/// `conversation_id` selects the shared default conversation.
#[derive(Debug, Deserialize)]
pub struct ExplainRequest {
    /// Reference text the query is about (code, prose, anything)
    #[serde(default)]
    pub text: Option<String>,

    /// The caller's question; a default instruction is substituted when
    /// empty or absent
    #[serde(default)]
    pub query: Option<String>,

    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// Body of `POST /follow_up`. Both fields are required; their absence is
/// rejected with 400 before any session lookup happens.
#[derive(Debug, Deserialize)]
pub struct FollowUpRequest {
    #[serde(default)]
    pub query: Option<String>,

    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// Response of `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub sessions: usize,
}
