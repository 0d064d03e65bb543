//! CodePartner server - a local HTTP façade over a hosted LLM API
//!
//! This library implements a small streaming explanation service:
//!
//! - **Session Registry**: conversation ids map to reusable sessions whose
//!   chat history carries context into follow-up questions
//! - **Streaming Relay**: completions are relayed to the caller as plain
//!   text chunks while the model generates them, never buffered whole
//! - **Bounded growth**: idle sessions are swept and an LRU cap bounds the
//!   registry, so a long-lived process does not accumulate state forever
//!
//! # Architecture
//!
//! The codebase is organized into three layers:
//!
//! - [`core`]: configuration, errors, logging, relay status, PID file
//! - [`api`]: HTTP handlers, request models, and the streaming relay
//! - [`services`]: the session registry and the upstream client
//!
//! # Configuration
//!
//! The server requires one environment variable:
//! - `CODEPARTNER_API_KEY`: upstream API key (startup fails without it)
//!
//! Optional environment variables:
//! - `HOST` / `PORT`: bind address (default: 127.0.0.1:5000)
//! - `API_BASE`: OpenAI-compatible API base URL
//! - `MODEL`: model name to request
//! - `REQUEST_TIMEOUT_SECS`, `FIRST_CHUNK_TIMEOUT_SECS`: upstream deadlines
//! - `SESSION_IDLE_TIMEOUT_SECS`, `SESSION_MAX_ENTRIES`,
//!   `SESSION_SWEEP_INTERVAL_SECS`: registry bounds
//! - `LOG_DIR`, `LOG_MAX_SIZE_MB`, `LOG_BACKUP_COUNT`, `LOG_KEEP_DAYS`:
//!   request log rotation
//! - `PID_FILE`: PID file path

pub mod api;
pub mod core;
pub mod services;

// Re-export commonly used types for convenience
pub use api::{build_router, AppState, ExplainRequest, FollowUpRequest, DEFAULT_QUERY};
pub use core::{AppConfig, AppError, PidFile, RequestLog, Result};
pub use services::{ProviderClient, SessionRegistry};
