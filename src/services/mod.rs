//! Business logic for the explanation server.
//!
//! - [`registry`]: conversation session registry
//! - [`provider`]: upstream chat-completions client

pub mod provider;
pub mod registry;

pub use provider::{ChatMessage, ProviderClient};
pub use registry::{ConversationSession, SessionRegistry, DEFAULT_CONVERSATION_KEY};
