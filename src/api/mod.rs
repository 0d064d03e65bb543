//! HTTP surface of the explanation server.
//!
//! - [`handlers`]: route handlers and router assembly
//! - [`models`]: request/response types
//! - [`streaming`]: SSE decoding and the text relay
//! - [`disconnect`]: client-disconnect detection for streamed bodies

pub mod disconnect;
pub mod handlers;
pub mod models;
pub mod streaming;

pub use handlers::{build_router, explain, follow_up, health, AppState, DEFAULT_QUERY};
pub use models::{ExplainRequest, FollowUpRequest, HealthResponse};
