//! API Server for Agent Boss
//!
//! Hosts the orchestration core behind a REST API and a Socket.IO channel
//! on a single port.

mod error;
mod routes;
mod socket;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_runner::OrchestratorConfig;

use crate::socket::{create_socket_layer, spawn_event_bridge};
use crate::state::AppState;

const DEFAULT_PORT: u16 = 3001;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "api_server=debug,agent_runner=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let port = match std::env::var("PORT") {
        Ok(raw) => raw
            .trim()
            .parse::<u16>()
            .with_context(|| format!("PORT must be a port number, got {:?}", raw))?,
        Err(_) => DEFAULT_PORT,
    };
    let data_dir = std::env::var("BOSS_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"));
    let config = OrchestratorConfig::from_env().context("Invalid orchestrator configuration")?;

    tracing::info!("Using data directory: {:?}", data_dir);
    tracing::info!("Workspaces under: {:?}", config.workspace_root);

    let app_state = AppState::new(data_dir, port, config)
        .await
        .context("Failed to initialize application state")?;

    let (socket_layer, io) = create_socket_layer(app_state.clone());
    let bridge = spawn_event_bridge(io, app_state.events().subscribe());

    // Later layers wrap earlier ones: CORS runs first, then tracing, ahead of the socket layer
    let app = Router::new()
        .merge(routes::health::router())
        .merge(routes::agents::router())
        .merge(routes::work_items::router())
        .merge(routes::config::router())
        .with_state(app_state.clone())
        .layer(socket_layer)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Agent Boss listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Stopping all agents");
    app_state.pool().stop_all().await;
    bridge.abort();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
