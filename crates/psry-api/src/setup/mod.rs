//! Application setup and initialization

pub mod routes;
pub mod server;

use crate::state::AppState;
use anyhow::{Context, Result};
use psry_core::telemetry::init_tracing;
use psry_core::Config;
use std::sync::Arc;

/// Initialize the entire application
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router)> {
    init_tracing(&config.log_format);

    // Fail fast on misconfiguration
    config
        .validate()
        .context("Configuration validation failed")?;
    tracing::info!(
        environment = %config.environment,
        store_backend = ?config.record_store_backend,
        storage_backend = %config.storage_backend,
        "Configuration loaded and validated successfully"
    );

    let store = psry_db::create_record_store(&config)
        .await
        .context("Failed to initialize record store")?;
    let storage = psry_storage::create_storage(&config)
        .await
        .context("Failed to initialize storage")?;

    let state = Arc::new(AppState::new(
        store,
        storage,
        config.max_upload_size_bytes,
        config.pipeline.service_timeout,
    ));
    let router = routes::setup_routes(&config, state.clone());

    Ok((state, router))
}
