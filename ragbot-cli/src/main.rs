use anyhow::Context;
use clap::Parser;
use ragbot_core::config::DEFAULT_ENV_FILE;
use ragbot_core::{AgentFactory, EchoAgentFactory, OpenAiAgentFactory, Settings};
use ragbot_http::{start_server, ServerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ragbot", version, about = "Streaming chat backend for the RAG chatbot")]
struct Args {
    /// Host to bind (overrides APP_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides APP_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Env file read before the process environment
    #[arg(long, default_value = DEFAULT_ENV_FILE)]
    env_file: PathBuf,

    /// Serve the offline echo backend instead of OpenAI
    #[arg(long)]
    echo: bool,

    /// Send each prompt without earlier turns of its session
    #[arg(long)]
    no_history: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let args = Args::parse();

    let mut settings = Settings::load(Some(&args.env_file))
        .context("Configuration error: missing or invalid environment variables")?;
    if let Some(host) = args.host {
        settings.host = host;
    }
    if let Some(port) = args.port {
        settings.port = port;
    }
    info!("Loaded settings: {:?}", settings);

    let settings = Arc::new(settings);
    let agents: Arc<dyn AgentFactory> = if args.echo {
        info!("Using offline echo backend");
        Arc::new(EchoAgentFactory::new())
    } else {
        info!("Using OpenAI backend (model {})", settings.model);
        Arc::new(
            OpenAiAgentFactory::new(settings.clone()).with_history_in_context(!args.no_history),
        )
    };

    start_server(ServerConfig::from_settings(&settings), agents).await
}
