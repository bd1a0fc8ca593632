//! Main Entrypoint for the Interview Relay Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Preparing the interviewer session configuration.
//! 3. Constructing the Axum router and applying middleware.
//! 4. Starting the web server and handling graceful shutdown.

use anyhow::{Context, anyhow};
use interview_relay::{config::Config, router::create_router, state::AppState};
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal. Shutting down gracefully..."),
        Err(e) => warn!(error = %e, "Failed to listen for Ctrl+C, running until killed"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let mut config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();

    // Provider connections are wss:// and need a process-wide TLS backend.
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    // --- 3. Prepare the Interviewer Session ---
    if let Some(path) = &config.instructions_path {
        let instructions = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read instructions from {}", path.display()))?;
        info!(path = %path.display(), "Loaded interviewer instructions");
        config.session.instructions = instructions;
    }

    if config.openai_api_key.is_none() {
        warn!("OPENAI_API_KEY is not set. Every interview will be closed with MissingCredential.");
    }

    info!(
        model = %config.realtime_model,
        voice = ?config.session.voice,
        upstream = %config.realtime_url,
        "Configuration loaded. Initializing application state..."
    );
    let bind_address = config.bind_address;
    let app_state =
        Arc::new(AppState::new(config).context("Failed to encode session configuration")?);

    // --- 4. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 5. Start Server ---
    info!(bind_address = %bind_address, "Starting server...");
    let listener = tokio::net::TcpListener::bind(bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
