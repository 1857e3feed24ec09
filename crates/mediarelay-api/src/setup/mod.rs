//! Application setup and initialization
//!
//! Kept out of main.rs so integration tests can build the same router.

pub mod routes;
pub mod server;
pub mod services;
pub mod validation;

use crate::state::AppState;
use anyhow::{Context, Result};
use mediarelay_core::Config;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Initialize the entire application. The returned handle is the background
/// sweep, to be aborted on shutdown.
pub async fn initialize_app(
    config: Config,
) -> Result<(Arc<AppState>, axum::Router, JoinHandle<()>)> {
    mediarelay_infra::init_telemetry(config.log_json());

    // Fail fast on misconfiguration
    validation::validate_config(&config).context("Configuration validation failed")?;

    crate::error::hide_error_details(config.is_production());

    tracing::info!(
        environment = %config.environment(),
        "Configuration loaded and validated successfully"
    );

    let state = services::initialize_services(&config).await?;
    let sweep = services::start_background_tasks(&state);

    let router = routes::setup_routes(&config, state.clone())?;

    Ok((state, router, sweep))
}
