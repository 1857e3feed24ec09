//! Tracing subscriber initialization

use tracing_subscriber::{
    fmt::format::Format, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

const DEFAULT_FILTER: &str = "mediarelay=debug,tower_http=debug";

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the default filter. With `json` set, events are
/// written as JSON lines for log shippers; otherwise a compact console format
/// is used. Calling this twice is harmless: the second install is skipped.
pub fn init_telemetry(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());

    let installed = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init()
    } else {
        let console_fmt = tracing_subscriber::fmt::layer()
            .event_format(Format::default().compact().with_target(false));
        tracing_subscriber::registry()
            .with(filter)
            .with(console_fmt)
            .try_init()
    };

    match installed {
        Ok(()) => tracing::info!(json = json, "Tracing initialized"),
        Err(e) => tracing::debug!(error = %e, "Tracing subscriber already installed"),
    }
}
