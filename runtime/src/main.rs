use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use case_rag::{
    ai::HttpEmbedder,
    config::{AppConfig, load_config},
    pipeline::RagPipeline,
    routes::{AppState, app_router},
};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(error = %err, "Server crashed");
        for (depth, cause) in err.chain().skip(1).enumerate() {
            error!(cause_depth = depth + 1, cause = %cause, "caused by");
        }
        eprintln!("Server crashed: {err:#}");
    }
}

async fn run() -> Result<()> {
    init_tracing();
    if let Err(err) = dotenvy::dotenv() {
        info!(error = %err, "No .env file loaded");
    }

    let config = load_config()
        .await
        .context("Failed to load application configuration")?;
    let pipeline = build_pipeline(&config)?;

    let addr_string = format!("{}:{}", config.server.host, config.server.port);
    let addr = addr_string
        .parse::<SocketAddr>()
        .with_context(|| format!("Invalid server address: {addr_string}"))?;
    info!(host = %config.server.host, port = config.server.port, "Loaded configuration");

    let state = Arc::new(AppState {
        config: Arc::new(config),
        pipeline,
    });
    let app = app_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind TCP listener on {addr}"))?;
    info!(%addr, "RAG server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server encountered a fatal error")?;
    Ok(())
}

fn build_pipeline(config: &AppConfig) -> Result<Option<RagPipeline>> {
    let embedding = &config.embedding;
    if !embedding.is_configured() {
        warn!("RAG disabled: embedding endpoint, API key and model are required");
        return Ok(None);
    }

    let embedder = HttpEmbedder::new(
        &embedding.endpoint,
        embedding.api_key.clone(),
        embedding.model.clone(),
        embedding.timeout(),
    )
    .context("Failed to build embedding client")?;
    info!(url = %embedder.url(), model = %embedding.model, "Embedding client ready");

    Ok(Some(RagPipeline::new(
        Arc::new(embedder),
        config.rag.pipeline_config(),
    )))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received termination signal (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received termination signal (SIGTERM)");
        }
    }
}
