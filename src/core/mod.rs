//! Core functionality for the explanation server.
//!
//! This module contains fundamental components used throughout the
//! application:
//! - Configuration management
//! - Error handling
//! - Request-scoped logging context
//! - Rotating request log file
//! - Relay outcome tracking
//! - PID file bookkeeping

pub mod config;
pub mod error;
pub mod logging;
pub mod pidfile;
pub mod relay;
pub mod request_logger;

// Re-export commonly used types
pub use relay::RelayStatus;
pub use config::{AppConfig, LogConfig, ProviderConfig, ServerConfig, SessionConfig};
pub use error::{AppError, Result};
pub use logging::{generate_request_id, get_request_id, REQUEST_ID};
pub use pidfile::PidFile;
pub use request_logger::RequestLog;
