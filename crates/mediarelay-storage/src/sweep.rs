use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;

use crate::error::StorageResult;
use crate::temp::{SweepReport, TempStore};

/// Background task that reaps orphaned transient files
#[derive(Clone)]
pub struct SweepService {
    store: TempStore,
    every: Duration,
    max_age: Duration,
}

impl SweepService {
    pub fn new(store: TempStore, every: Duration, max_age: Duration) -> Self {
        Self {
            store,
            every,
            max_age,
        }
    }

    /// Start the periodic sweep. The first pass runs immediately so files
    /// left behind by a previous process are reclaimed at start-up.
    /// Returns a JoinHandle for graceful shutdown
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut sweep_interval = interval(self.every);

            tracing::info!(
                interval_secs = self.every.as_secs(),
                max_age_secs = self.max_age.as_secs(),
                dir = %self.store.dir().display(),
                "Transient file sweep started"
            );

            loop {
                sweep_interval.tick().await;

                if let Err(e) = self.run_once().await {
                    tracing::error!(error = %e, "Transient file sweep failed");
                }
            }
        })
    }

    pub async fn run_once(&self) -> StorageResult<SweepReport> {
        let report = self.store.sweep(self.max_age).await?;

        if report.deleted > 0 || report.failed > 0 || report.skipped_active > 0 {
            tracing::info!(
                scanned = report.scanned,
                deleted = report.deleted,
                skipped_active = report.skipped_active,
                failed = report.failed,
                "Transient file sweep completed"
            );
        } else {
            tracing::debug!(scanned = report.scanned, "Transient file sweep found nothing to delete");
        }

        Ok(report)
    }
}
