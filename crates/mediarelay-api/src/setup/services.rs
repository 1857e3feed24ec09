//! Relay service construction
//!
//! Every component gets its settings from [`Config`] at construction time;
//! nothing reads configuration globally afterwards.

use crate::state::AppState;
use anyhow::{Context, Result};
use mediarelay_core::{Config, RelayConfig};
use mediarelay_services::{
    ContentFetcher, FetcherConfig, RetryPolicy, StrategySet, SweepService, TempStore,
    TransferConfig, TransferService, UploadEngine, UploadEngineConfig, DEFAULT_MAX_CANDIDATES,
};
use std::sync::Arc;
use std::time::Duration;

fn retry_policy(relay: &RelayConfig) -> RetryPolicy {
    RetryPolicy::new(
        relay.retry_max_attempts,
        Duration::from_millis(relay.retry_base_delay_ms),
        Duration::from_millis(relay.retry_max_delay_ms),
    )
}

pub fn fetcher_config(relay: &RelayConfig) -> FetcherConfig {
    FetcherConfig {
        timeout: Duration::from_secs(relay.fetch_timeout_secs),
        max_bytes: relay.max_source_bytes,
        user_agents: relay.user_agents.clone(),
        retry: retry_policy(relay),
    }
}

pub fn upload_engine_config(relay: &RelayConfig) -> UploadEngineConfig {
    UploadEngineConfig {
        endpoint: relay.destination_url.clone(),
        userhash: relay.destination_userhash.clone(),
        chunk_threshold: relay.chunk_threshold_bytes,
        chunk_size: relay.chunk_size_bytes,
        max_parallel_chunks: relay.max_parallel_chunks,
        timeout: Duration::from_secs(relay.upload_timeout_secs),
        retry: retry_policy(relay),
    }
}

pub fn transfer_config(config: &Config) -> TransferConfig {
    TransferConfig {
        batch_concurrency: config.relay().batch_concurrency,
        max_candidates: DEFAULT_MAX_CANDIDATES,
        remote_upload: config.relay().destination_remote_upload,
        source_policy: config.source_policy(),
    }
}

/// Build the relay pipeline and the state handlers share.
pub async fn initialize_services(config: &Config) -> Result<Arc<AppState>> {
    let relay = config.relay();

    tracing::info!(dir = %config.temp_dir().display(), "Initializing transient storage...");
    let temp_store = TempStore::new(config.temp_dir().clone())
        .await
        .context("Failed to initialize transient storage")?;

    let fetcher = ContentFetcher::new(fetcher_config(relay))?;
    let uploader = UploadEngine::new(upload_engine_config(relay))?;
    let extractors = StrategySet::with_defaults()?;

    tracing::info!(
        destination = %relay.destination_url,
        remote_upload = relay.destination_remote_upload,
        strategies = extractors.len(),
        chunk_threshold_bytes = relay.chunk_threshold_bytes,
        max_parallel_chunks = relay.max_parallel_chunks,
        batch_concurrency = relay.batch_concurrency,
        "Relay services initialized"
    );

    let transfers = TransferService::new(
        fetcher,
        extractors,
        uploader,
        temp_store,
        transfer_config(config),
    );

    Ok(Arc::new(AppState {
        config: config.clone(),
        transfers: Arc::new(transfers),
    }))
}

/// Start the periodic sweep of orphaned transient files.
pub fn start_background_tasks(state: &Arc<AppState>) -> tokio::task::JoinHandle<()> {
    let sweep = SweepService::new(
        state.temp_store().clone(),
        Duration::from_secs(state.config.sweep_interval_secs()),
        Duration::from_secs(state.config.temp_max_age_secs()),
    );
    let handle = Arc::new(sweep).start();
    tracing::info!(
        every_secs = state.config.sweep_interval_secs(),
        "Started transient file sweep background task"
    );
    handle
}
