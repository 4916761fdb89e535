//! # lra-coordinator: Binary Entry Point
//!
//! Loads the registry snapshot, starts the recovery loop and serves the
//! coordination protocol until Ctrl-C. The registry is saved on shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use lra_api::{AppState, Coordinator, CoordinatorArgs, CoordinatorConfig, RecoveryTask, Registry};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CoordinatorArgs::parse();
    init_tracing(args.log_json);

    let config = CoordinatorConfig::try_from(args)?;
    let registry = Registry::load(config.snapshot_path.clone());
    tracing::info!(lras = registry.len(), "registry loaded");

    let coordinator = Arc::new(Coordinator::new(registry, config.clone())?);
    let recovery = RecoveryTask::spawn(Arc::clone(&coordinator));
    let app = lra_api::app(AppState::new(Arc::clone(&coordinator)));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, base_url = %config.base_url, "LRA coordinator listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    recovery.stop().await;
    coordinator.registry().save_or_log();
    tracing::info!("LRA coordinator stopped");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
