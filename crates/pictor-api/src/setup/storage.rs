//! Storage setup and initialization

use anyhow::{Context, Result};
use pictor_core::Config;
use pictor_storage::{create_storage, Storage};
use std::sync::Arc;

pub async fn setup_storage(config: &Config) -> Result<Arc<dyn Storage>> {
    tracing::info!("Initializing storage backend...");
    let storage = create_storage(config)
        .await
        .context("Failed to initialize storage backend")?;
    tracing::info!(
        backend = ?storage.backend_type(),
        "Storage backend initialized successfully"
    );
    Ok(storage)
}
