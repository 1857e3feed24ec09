//! Health check handler and response types.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
pub(super) struct TempStoreHealth {
    pub dir: String,
    pub writable: bool,
    pub allocated: u64,
    pub released: u64,
    pub active: usize,
}

#[derive(Serialize)]
pub(super) struct HealthCheckResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub temp_store: TempStoreHealth,
}

/// Liveness plus the transient store's counters. Reports `degraded` with a
/// 503 when the scratch directory has gone missing.
pub(super) async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let store = state.temp_store();
    let stats = store.stats();
    let writable = tokio::fs::metadata(store.dir())
        .await
        .map(|m| m.is_dir() && !m.permissions().readonly())
        .unwrap_or(false);

    let (status_code, status) = if writable {
        (StatusCode::OK, "ok")
    } else {
        tracing::error!(dir = %store.dir().display(), "Transient directory unavailable");
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status_code,
        Json(HealthCheckResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            temp_store: TempStoreHealth {
                dir: store.dir().display().to_string(),
                writable,
                allocated: stats.allocated,
                released: stats.released,
                active: stats.active,
            },
        }),
    )
}
