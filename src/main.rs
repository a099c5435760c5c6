// gem2openai - Cookie-session Gemini web client exposed as an OpenAI-compatible API
// Author: kelexine (https://github.com/kelexine)

use anyhow::{Context, Result};
use clap::Parser;
use gem2openai::cli::Args;
use gem2openai::config::AppConfig;
use gem2openai::gemini::{GeminiBackend, GeminiClient};
use gem2openai::server::{create_router, AppState};
use gem2openai::utils::logging;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Phase 1: Load configuration
    let mut config = AppConfig::load(args.config.as_deref(), args.env_file.as_deref())?;
    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    if args.print_config {
        println!("{}", toml::to_string_pretty(&config.redacted())?);
        return Ok(());
    }

    // Phase 2: Initialize logging
    logging::init(&config.logging)?;
    info!("Starting gem2openai v{}", env!("CARGO_PKG_VERSION"));

    // Phase 3: Validate settings before touching the network
    if let Err(e) = config.validate() {
        error!("{}", e);
        return Err(e.into());
    }
    for (key, value) in config.summary() {
        info!("  {}: {}", key, value);
    }
    if args.check {
        info!("Configuration OK");
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.workers.max(1))
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(serve(config))
}

async fn serve(config: AppConfig) -> Result<()> {
    // Phase 4: Initialize the Gemini web session (token scrape + verification)
    let client = Arc::new(GeminiClient::new(&config)?);
    info!("Initializing Gemini web session...");
    client.init().await?;
    info!("Gemini web session ready");

    // Phase 5: Build and start HTTP server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", config.server.host, config.server.port))?;
    let backend: Arc<dyn GeminiBackend> = client.clone();
    let state = AppState::new(config, backend);

    let sessions = Arc::clone(&state.sessions);
    let sweeper = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            sessions.purge_expired();
        }
    });

    let app = create_router(state);

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Phase 6: Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    client.close().await;
    info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
