use mediarelay_api::setup;
use mediarelay_core::Config;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = Config::from_env()?;

    // Telemetry, relay services, background sweep and routes
    let (_state, router, sweep) = setup::initialize_app(config.clone()).await?;

    let served = setup::server::start_server(&config, router).await;
    sweep.abort();
    served?;

    Ok(())
}
