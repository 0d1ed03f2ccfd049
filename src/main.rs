use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use mediafetch::config::Config;
use mediafetch::downloader::{JobRegistry, Orchestrator};
use mediafetch::server::{self, AppState};
use mediafetch::ytdlp::YtDlpProvider;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mediafetch=info")),
        )
        .init();

    let config = Arc::new(Config::from_env());
    info!(?config, "starting mediafetch");

    std::fs::create_dir_all(&config.download_dir).with_context(|| {
        format!(
            "creating download directory {}",
            config.download_dir.display()
        )
    })?;

    let provider = Arc::new(YtDlpProvider::new(&config));
    let registry = Arc::new(JobRegistry::new());
    let orchestrator = Arc::new(Orchestrator::new(provider, registry.clone(), config.clone()));

    let app = server::router(AppState {
        orchestrator,
        registry,
    });

    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running API server")?;

    Ok(())
}

async fn shutdown_signal() {
    // a failed handler only affects graceful shutdown; Ctrl+C still kills
    // the process
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "failed to install Ctrl+C handler");
    }
}
