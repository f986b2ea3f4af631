//! Database setup and record store selection

use anyhow::{Context, Result};
use psry_core::{Config, RecordStoreBackend};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use crate::{InMemoryRecordStore, PgRecordStore, RecordStore};

/// Open the PostgreSQL connection pool.
pub async fn connect_pool(config: &Config) -> Result<PgPool> {
    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL is not set")?;

    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(config.db_timeout_seconds))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!(
        max_connections = config.db_max_connections,
        "Database connected successfully"
    );

    Ok(pool)
}

/// Build the record store selected by `STORE_BACKEND`, creating the schema when needed.
pub async fn create_record_store(config: &Config) -> Result<Arc<dyn RecordStore>> {
    match config.record_store_backend {
        RecordStoreBackend::Postgres => {
            let pool = connect_pool(config).await?;
            let store = PgRecordStore::new(pool, &config.record_table)?;
            store.ensure_schema().await?;
            Ok(Arc::new(store))
        }
        RecordStoreBackend::Memory => {
            tracing::warn!("Using in-memory record store; records are lost on restart");
            Ok(Arc::new(InMemoryRecordStore::new()))
        }
    }
}
