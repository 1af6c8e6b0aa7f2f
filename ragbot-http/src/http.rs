use axum::{
    routing::{get, post},
    Router,
};
use ragbot_core::{AgentFactory, Settings};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::apis;

/// Configuration for the HTTP server
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Server bind address (e.g., "127.0.0.1:8000")
    pub address: String,
    /// Capacity of each request's fragment channel
    pub stream_buffer: usize,
}

impl ServerConfig {
    pub fn new(address: String) -> Self {
        Self {
            address,
            stream_buffer: ragbot_core::config::DEFAULT_STREAM_BUFFER,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            address: settings.address(),
            stream_buffer: settings.stream_buffer,
        }
    }

    pub fn with_stream_buffer(mut self, stream_buffer: usize) -> Self {
        self.stream_buffer = stream_buffer;
        self
    }
}

/// Server state shared by every handler
#[derive(Clone)]
pub struct ServerState {
    pub agents: Arc<dyn AgentFactory>,
    pub stream_buffer: usize,
}

impl ServerState {
    pub fn new(agents: Arc<dyn AgentFactory>, stream_buffer: usize) -> Self {
        Self {
            agents,
            stream_buffer,
        }
    }
}

/// Build the application router
pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/chat/stream", post(apis::handle_chat_stream))
        .route("/health", get(apis::handle_health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Start the HTTP server and serve until Ctrl+C
pub async fn start_server(config: ServerConfig, agents: Arc<dyn AgentFactory>) -> anyhow::Result<()> {
    let state = ServerState::new(agents, config.stream_buffer);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.address).await?;

    println!("Server starting on \x1b[1mhttp://{}\x1b[0m", config.address);
    println!("\nAvailable endpoints:");
    println!("  \x1b[1mPOST /chat/stream\x1b[0m   - Stream a chat reply (NDJSON)");
    println!("  \x1b[1mGET  /health\x1b[0m        - Liveness probe");
    println!("\nPress Ctrl+C to stop\n");

    info!("HTTP server listening on {}", config.address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
