//! Configuration validation
//!
//! Startup checks beyond [`Config::validate`] that only warn.

use anyhow::Result;
use mediarelay_core::Config;

/// Validate configuration, failing on hard errors and warning on risky settings.
pub fn validate_config(config: &Config) -> Result<()> {
    config.validate()?;

    let relay = config.relay();

    if config.is_production() && relay.allow_private_hosts {
        tracing::warn!(
            "ALLOW_PRIVATE_HOSTS is enabled in production - sources may reach internal services"
        );
    }

    if relay.destination_userhash.is_none() {
        tracing::info!("DESTINATION_USERHASH not set - uploads will be anonymous");
    }

    if relay.sweep_interval_secs > relay.temp_max_age_secs {
        tracing::warn!(
            sweep_interval_secs = relay.sweep_interval_secs,
            temp_max_age_secs = relay.temp_max_age_secs,
            "Sweep runs less often than the staleness threshold - orphaned files may linger"
        );
    }

    let max_in_flight = relay.batch_concurrency * relay.max_parallel_chunks;
    if max_in_flight > 64 {
        tracing::warn!(
            max_in_flight = max_in_flight,
            "BATCH_CONCURRENCY x MAX_PARALLEL_CHUNKS is very high - the destination may rate limit"
        );
    }

    Ok(())
}
