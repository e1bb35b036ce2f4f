use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::anyhow;
use axum::{Router, routing::get};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{info, warn};

use chorus_gateway::{
    AppState, Provider, ProviderKind, ServerConfig,
    config::SHUTDOWN_GRACE,
    core::provider::create_provider,
    handlers, routes,
};

/// Chorus Gateway - real-time speech-to-text relay racing multiple providers
#[derive(Parser, Debug)]
#[command(name = "chorus-gateway")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Port to listen on
    #[arg(short = 'p', long = "port", default_value_t = chorus_gateway::config::DEFAULT_PORT)]
    port: u16,

    /// Enable the Deepgram provider
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    deepgram: bool,

    /// Enable the AssemblyAI provider
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    assemblyai: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before reading any configuration from the environment.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let mut config = ServerConfig::from_env().map_err(|e| anyhow!(e.to_string()))?;
    config.port = cli.port;

    let mut requested: Vec<ProviderKind> = Vec::new();
    if cli.deepgram {
        requested.push(ProviderKind::Deepgram);
    }
    if cli.assemblyai {
        requested.push(ProviderKind::AssemblyAi);
    }

    // A provider that cannot be constructed (usually missing credentials) is
    // skipped; only losing all of them is fatal.
    let mut providers: Vec<Arc<dyn Provider>> = Vec::new();
    for kind in requested {
        match create_provider(kind, &config) {
            Ok(provider) => providers.push(provider),
            Err(err) => warn!(provider = %kind, error = %err, "failed to create provider"),
        }
    }

    if providers.is_empty() {
        anyhow::bail!("no providers available: enable at least one provider with credentials set");
    }

    info!(count = providers.len(), "starting gateway");

    let state = AppState::new(config.clone(), providers);

    let app = Router::new()
        .route("/", get(handlers::health_check))
        .merge(routes::stream::create_stream_router())
        .with_state(state.clone());

    let address: SocketAddr = config
        .address()
        .parse()
        .map_err(|e| anyhow!("invalid server address '{}': {}", config.address(), e))?;

    let listener = TcpListener::bind(address).await?;
    info!("listening on ws://{address}/ws");

    let (drain_tx, drain_rx) = oneshot::channel();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.clone(), drain_tx));

    // The drain deadline starts ticking when the shutdown signal arrives;
    // connections that outlive it are abandoned rather than waited on.
    tokio::select! {
        result = async move { server.await } => result?,
        _ = async {
            let _ = drain_rx.await;
            tokio::time::sleep(SHUTDOWN_GRACE).await;
        } => {
            warn!("graceful drain deadline exceeded, exiting");
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// Wait for ctrl-c, then stop every live connection cooperatively.
async fn shutdown_signal(state: Arc<AppState>, drain_tx: oneshot::Sender<()>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        return;
    }

    info!(
        connections = state.connections.len(),
        "shutdown signal received, stopping live connections"
    );
    state.connections.stop_all();
    let _ = drain_tx.send(());
}
