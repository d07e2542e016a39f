//! Application setup and initialization
//!
//! Startup is split so tests can build the same router over in-memory
//! backends: [`services::build_state`] and [`routes::build_router`] take
//! their collaborators explicitly, while [`initialize_app`] wires the
//! production ones from [`Config`].

pub mod database;
pub mod routes;
pub mod server;
pub mod services;
pub mod storage;

use crate::state::AppState;
use anyhow::{Context, Result};
use pictor_core::Config;
use std::sync::Arc;

/// Initialize the entire application
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router)> {
    // Fail fast on misconfiguration
    config
        .validate()
        .context("Configuration validation failed")?;
    tracing::info!(
        environment = %config.environment(),
        "Configuration loaded and validated successfully"
    );

    let pool = database::setup_database(&config).await?;
    let storage = storage::setup_storage(&config).await?;

    let state = services::initialize_services(&config, pool, storage)?;
    let router = routes::setup_routes(&config, state.clone())?;

    Ok((state, router))
}
