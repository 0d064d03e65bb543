//! CodePartner server - main entry point
//!
//! Loads configuration from the environment, sets up logging and the PID
//! file, and runs the HTTP server until interrupted.

use anyhow::Result;
use codepartner_server::{
    api::{build_router, AppState},
    core::{AppConfig, PidFile, RequestLog},
    services::{ProviderClient, SessionRegistry},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const LOG_NAME: &str = "codepartner_server";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before reading any environment variables)
    dotenvy::dotenv().ok();

    init_tracing();

    // Missing API key is fatal here, before anything binds.
    let config = AppConfig::from_env()?;

    let request_log = RequestLog::start(&config.log, LOG_NAME)?;
    let _pid_file = PidFile::write(config.pid_file.clone())?;

    let provider = ProviderClient::new(config.provider.clone())?;
    let registry = SessionRegistry::new(&config.sessions);

    let state = Arc::new(AppState {
        registry,
        provider,
        request_log,
    });

    spawn_session_sweeper(state.clone(), config.sessions.sweep_interval);

    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!(
        addr = %addr,
        model = %config.provider.model,
        "Starting CodePartner server"
    );
    tracing::info!("Endpoints: POST /explain, POST /follow_up, GET /health");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Initialize console logging with an env-controlled filter.
///
/// Always appends noise suppression for hyper/reqwest so a broad RUST_LOG
/// does not drown the request logs in HTTP library chatter.
fn init_tracing() {
    let base_filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info,codepartner_server=debug".to_string());
    let filter_str = format!("{},hyper=warn,h2=warn,reqwest=warn", base_filter);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(filter_str))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Periodically sweep idle sessions out of the registry.
fn spawn_session_sweeper(state: Arc<AppState>, interval: std::time::Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let removed = state.registry.sweep_idle();
            if removed > 0 {
                tracing::info!(removed, live = state.registry.len(), "Swept idle sessions");
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    } else {
        tracing::info!("Shutdown signal received");
    }
}
