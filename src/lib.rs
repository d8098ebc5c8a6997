//! runconductor -- test-run lifecycle orchestration for remote network test controllers.
//!
//! This crate mirrors local test configurations onto a remote controller,
//! launches and monitors runs until they settle, ingests their results, and
//! relays generated reports and charts into blob storage.

pub mod api;
pub mod config;
pub mod controller;
pub mod model;
pub mod orchestrator;
pub mod storage;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::ConductorConfig;
use crate::controller::HttpController;
use crate::orchestrator::Orchestrator;
use crate::storage::blob::LocalBlobStore;
use crate::storage::Store;

/// Open the record store at the configured path, creating its directory.
pub fn open_store(config: &ConductorConfig) -> Result<Store> {
    let db_path = &config.storage.database_path;
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    tracing::info!(db_path = %db_path.display(), "Initializing database");
    Store::open(&db_path.to_string_lossy())
        .with_context(|| format!("failed to open database {}", db_path.display()))
}

/// Wire the store, the HTTP controller client and the local blob store together.
pub fn build_orchestrator(config: &ConductorConfig) -> Result<Orchestrator> {
    let store = open_store(config)?;
    let controller = HttpController::new(
        &config.controller.base_url,
        &config.controller.username,
        &config.controller.password,
        config.controller.request_timeout(),
    )
    .context("failed to set up controller client")?;
    let blobs = LocalBlobStore::new(&config.storage.blob_root);

    Ok(Orchestrator::new(
        store,
        Arc::new(controller),
        Arc::new(blobs),
        config.monitor.policy(),
    ))
}

/// Start the daemon: resume monitors for active runs, then serve the API
/// until Ctrl+C.
pub async fn serve(config: &ConductorConfig) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;

    let resumed = orchestrator.resume_active_runs().await?;
    tracing::info!(resumed, "Run monitors attached");

    let addr: std::net::SocketAddr = config
        .api
        .bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", config.api.bind))?;
    let app = api::router(api::state::AppState {
        orchestrator: orchestrator.clone(),
    });

    tracing::info!(%addr, controller = %config.controller.base_url, "runconductor listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down; active runs will resume on next start");
    orchestrator.monitors().abort_all().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received shutdown signal");
}

/// Read a JSON document from a file, for CLI payload arguments.
pub fn read_json_file(path: &Path) -> Result<serde_json::Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid JSON in {}", path.display()))
}
