//! Fixed-interval run driver
//!
//! Triggers an ingestion run at startup (optionally) and then once per
//! interval until the shutdown token is cancelled. Ticks that fall due while a
//! run is still executing are skipped rather than queued.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::orchestrator::IngestOrchestrator;
use super::IngestError;

pub struct IngestScheduler {
    orchestrator: Arc<IngestOrchestrator>,
    interval: Duration,
    run_on_startup: bool,
}

impl IngestScheduler {
    pub fn new(orchestrator: Arc<IngestOrchestrator>, interval: Duration, run_on_startup: bool) -> Self {
        Self {
            orchestrator,
            interval,
            run_on_startup,
        }
    }

    /// Spawn [`run`](Self::run) onto the runtime.
    pub fn start(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run(shutdown).await;
        })
    }

    /// Drive runs until `shutdown` is cancelled. Returns the number of runs
    /// attempted.
    pub async fn run(&self, shutdown: CancellationToken) -> usize {
        let mut ticker = if self.run_on_startup {
            interval(self.interval)
        } else {
            interval_at(Instant::now() + self.interval, self.interval)
        };
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_secs = self.interval.as_secs(),
            run_on_startup = self.run_on_startup,
            "Ingestion scheduler started"
        );

        let mut attempted = 0;
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {},
            }

            attempted += 1;
            match self.orchestrator.run_ingestion(&shutdown).await {
                Ok(summary) => info!(
                    batch_id = %summary.run.batch_id,
                    fetched = summary.fetched,
                    "Scheduled ingestion finished"
                ),
                Err(IngestError::AlreadyRunning) => {
                    warn!("Previous ingestion still running, skipping tick")
                },
                Err(e) if e.is_cancelled() => info!("Scheduled ingestion cancelled"),
                Err(e) => error!(error = %e, "Scheduled ingestion failed"),
            }
        }

        info!(runs = attempted, "Ingestion scheduler stopped");
        attempted
    }
}
