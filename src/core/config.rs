//! Configuration management for the explanation server.
//!
//! All configuration comes from environment variables (a `.env` file is
//! loaded first via `dotenvy`). The only required variable is
//! `CODEPARTNER_API_KEY`; everything else has a sensible local default.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server configuration (host, port)
    pub server: ServerConfig,

    /// Upstream provider configuration
    pub provider: ProviderConfig,

    /// Session registry limits
    pub sessions: SessionConfig,

    /// Request log file settings
    pub log: LogConfig,

    /// Path of the PID file written at startup
    pub pid_file: PathBuf,
}

/// Server-specific configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,
}

/// Upstream chat-completions provider configuration.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL of the OpenAI-compatible API
    pub api_base: String,

    /// API key for authentication (required)
    pub api_key: String,

    /// Model to request completions from
    pub model: String,

    /// Whole-request timeout for upstream calls, in seconds
    pub request_timeout_secs: u64,

    /// Deadline for the first streamed chunk; `None` disables the check
    pub first_chunk_timeout_secs: Option<u64>,
}

/// Session registry limits.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Sessions idle longer than this are swept
    pub idle_timeout: Duration,

    /// Maximum number of live sessions; the least-recently-used entry is
    /// evicted when a new session would exceed this
    pub max_entries: usize,

    /// How often the background sweep runs
    pub sweep_interval: Duration,
}

/// Request log file settings.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Directory holding the request log and its rotated backups
    pub dir: PathBuf,

    /// Rotate once the active log grows past this many bytes
    pub max_size_bytes: u64,

    /// Number of rotated backups to keep
    pub backup_count: usize,

    /// Rotated backups older than this many days are removed at startup
    pub keep_days: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Fails when `CODEPARTNER_API_KEY` is absent or empty; the server
    /// must not come up without an upstream key.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("CODEPARTNER_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .context("CODEPARTNER_API_KEY environment variable is not set")?;

        let host = env_or("HOST", "127.0.0.1");
        let port = env_parse("PORT", 5000)?;

        let provider = ProviderConfig {
            api_base: env_or("API_BASE", "https://api.groq.com/openai/v1"),
            api_key,
            model: env_or("MODEL", "llama3-70b-8192"),
            request_timeout_secs: env_parse("REQUEST_TIMEOUT_SECS", 300u64)?,
            first_chunk_timeout_secs: match env_parse("FIRST_CHUNK_TIMEOUT_SECS", 0u64)? {
                0 => None,
                secs => Some(secs),
            },
        };

        let sessions = SessionConfig {
            idle_timeout: Duration::from_secs(env_parse("SESSION_IDLE_TIMEOUT_SECS", 3600u64)?),
            max_entries: env_parse("SESSION_MAX_ENTRIES", 256usize)?,
            sweep_interval: Duration::from_secs(env_parse("SESSION_SWEEP_INTERVAL_SECS", 60u64)?),
        };

        let log = LogConfig {
            dir: PathBuf::from(env_or("LOG_DIR", "./logs")),
            max_size_bytes: env_parse("LOG_MAX_SIZE_MB", 10u64)? * 1024 * 1024,
            backup_count: env_parse("LOG_BACKUP_COUNT", 5usize)?,
            keep_days: env_parse("LOG_KEEP_DAYS", 30u64)?,
        };

        Ok(Self {
            server: ServerConfig { host, port },
            provider,
            sessions,
            log,
            pid_file: PathBuf::from(env_or("PID_FILE", "./codepartner_server.pid")),
        })
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Invalid value for {}: {}", name, raw)),
        Err(_) => Ok(default),
    }
}
