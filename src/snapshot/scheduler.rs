use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::error::Result;
use crate::snapshot::metrics::RunSummary;
use crate::snapshot::orchestrator::SnapshotOrchestrator;

/// Re-runs the snapshot on a fixed interval, or once when the interval is zero.
pub struct SnapshotScheduler {
    orchestrator: Arc<SnapshotOrchestrator>,
    interval: Duration,
}

impl SnapshotScheduler {
    pub fn new(orchestrator: Arc<SnapshotOrchestrator>, interval: Duration) -> Self {
        Self { orchestrator, interval }
    }

    pub async fn run_once(&self) -> Result<RunSummary> {
        self.orchestrator.run().await
    }

    /// With a zero interval this is `run_once`. Otherwise it loops forever;
    /// a failed run is logged and the next tick runs again.
    pub async fn run(self) -> Result<()> {
        if self.interval.is_zero() {
            self.run_once().await?;
            return Ok(());
        }

        let mut ticker = interval(self.interval);
        // A run that overruns the interval starts the next one right away, once.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = self.interval.as_secs(), "[SNAPSHOT] scheduler started");

        loop {
            ticker.tick().await;
            match self.run_once().await {
                Ok(summary) => info!(
                    positions = summary.positions_found,
                    elapsed_ms = summary.elapsed.as_millis() as u64,
                    "[SNAPSHOT] scheduled run finished"
                ),
                Err(e) => error!("[SNAPSHOT] scheduled run failed: {e}"),
            }
        }
    }
}
