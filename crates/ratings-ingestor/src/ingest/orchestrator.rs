//! Ingestion orchestrator
//!
//! Runs `fetch -> reconcile -> persist` for one ingestion run and serves the
//! read-side queries over stored events. Only one run executes at a time; a
//! second caller gets [`IngestError::AlreadyRunning`] instead of queueing.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use ratings_common::types::Stock;

use super::batch::BatchPersister;
use super::client::StockFeed;
use super::config::IngestConfig;
use super::models::{IngestionRun, IngestionSummary, RunPhase};
use super::reader::StockReader;
use super::reconciler::BrokerReconciler;
use super::storage::{BrokerRegistry, RunJournal, StockStore};
use super::IngestError;
use crate::db::DbResult;
use crate::query::{Page, StockFilters, StockStats};

pub struct IngestOrchestrator {
    feed: Arc<dyn StockFeed>,
    reconciler: BrokerReconciler,
    persister: BatchPersister,
    reader: StockReader,
    runs: Option<Arc<dyn RunJournal>>,
    run_lock: Mutex<()>,
}

impl IngestOrchestrator {
    pub fn new(
        feed: Arc<dyn StockFeed>,
        registry: Arc<dyn BrokerRegistry>,
        stocks: Arc<dyn StockStore>,
        config: &IngestConfig,
    ) -> Self {
        Self {
            feed,
            reconciler: BrokerReconciler::new(registry, config.default_credibility),
            persister: BatchPersister::new(Arc::clone(&stocks), config.batch_size, config.worker_count),
            reader: StockReader::new(stocks),
            runs: None,
            run_lock: Mutex::new(()),
        }
    }

    /// Record every run's outcome in `runs`.
    pub fn with_run_journal(mut self, runs: Arc<dyn RunJournal>) -> Self {
        self.reader = self.reader.with_run_journal(Arc::clone(&runs));
        self.runs = Some(runs);
        self
    }

    /// Execute one full ingestion run.
    pub async fn run_ingestion(
        &self,
        cancel: &CancellationToken,
    ) -> Result<IngestionSummary, IngestError> {
        let _guard = self
            .run_lock
            .try_lock()
            .map_err(|_| IngestError::AlreadyRunning)?;

        let run = IngestionRun::start();
        let span = info_span!("ingestion_run", batch_id = %run.batch_id);

        self.execute(run, cancel).instrument(span).await
    }

    async fn execute(
        &self,
        mut run: IngestionRun,
        cancel: &CancellationToken,
    ) -> Result<IngestionSummary, IngestError> {
        let started = Instant::now();
        self.journal_start(&run).await;

        run.enter(RunPhase::Fetching);
        info!(phase = %run.phase, "Ingestion run started");
        let phase_started = Instant::now();

        let mut records = match self.feed.fetch_all(cancel).await {
            Ok(records) => records,
            Err(e) => return Err(self.fail(run, e.into(), 0, 0).await),
        };
        let fetched = records.len();
        run.total_records = fetched as i64;

        info!(
            records = fetched,
            elapsed_ms = phase_started.elapsed().as_millis() as u64,
            "Fetch phase complete"
        );

        if records.is_empty() {
            run.complete(0, 0);
            self.journal_finish(&run).await;
            info!("No records fetched, nothing to ingest");
            return Ok(IngestionSummary {
                run,
                fetched,
                reconcile: None,
                persist: None,
                elapsed: started.elapsed(),
            });
        }

        run.enter(RunPhase::Reconciling);
        let phase_started = Instant::now();

        let reconcile = match self.reconciler.reconcile(&mut records).await {
            Ok(report) => report,
            Err(e) => return Err(self.fail(run, e.into(), 0, fetched as i64).await),
        };

        info!(
            matched = reconcile.matched,
            created = reconcile.created,
            elapsed_ms = phase_started.elapsed().as_millis() as u64,
            "Reconcile phase complete"
        );

        run.enter(RunPhase::Persisting);
        let phase_started = Instant::now();

        let persist = match self.persister.persist_all(records, cancel).await {
            Ok(report) => report,
            Err(e) => {
                let report = e.report();
                let (successful, failed) =
                    (report.committed_records as i64, report.unpersisted_records() as i64);
                return Err(self.fail(run, e.into(), successful, failed).await);
            },
        };

        info!(
            batches = persist.batches,
            inserted = persist.inserted,
            elapsed_ms = phase_started.elapsed().as_millis() as u64,
            "Persist phase complete"
        );

        run.complete(persist.committed_records as i64, 0);
        self.journal_finish(&run).await;

        let elapsed = started.elapsed();
        info!(
            fetched,
            inserted = persist.inserted,
            elapsed_ms = elapsed.as_millis() as u64,
            "Ingestion run completed"
        );

        Ok(IngestionSummary {
            run,
            fetched,
            reconcile: Some(reconcile),
            persist: Some(persist),
            elapsed,
        })
    }

    async fn fail(
        &self,
        mut run: IngestionRun,
        error: IngestError,
        successful: i64,
        failed: i64,
    ) -> IngestError {
        let phase = run.phase;
        run.fail(phase, &error.to_string(), successful, failed);

        if error.is_cancelled() {
            warn!(phase = %phase, "Ingestion run cancelled");
        } else {
            error!(phase = %phase, error = %error, "Ingestion run failed");
        }

        self.journal_finish(&run).await;
        error
    }

    async fn journal_start(&self, run: &IngestionRun) {
        if let Some(runs) = &self.runs {
            if let Err(e) = runs.record_start(run).await {
                warn!(error = %e, "Failed to record run start");
            }
        }
    }

    async fn journal_finish(&self, run: &IngestionRun) {
        if let Some(runs) = &self.runs {
            if let Err(e) = runs.record_finish(run).await {
                warn!(error = %e, "Failed to record run outcome");
            }
        }
    }

    // ------------------------------------------------------------------------
    // Read side
    // ------------------------------------------------------------------------

    pub async fn list_stocks(&self, filters: &StockFilters) -> DbResult<Page<Stock>> {
        self.reader.list_stocks(filters).await
    }

    pub async fn stocks_by_ticker(&self, ticker: &str) -> DbResult<Vec<Stock>> {
        self.reader.stocks_by_ticker(ticker).await
    }

    pub async fn stats(&self) -> DbResult<StockStats> {
        self.reader.stats().await
    }

    pub async fn recent_runs(&self, limit: i64) -> DbResult<Vec<IngestionRun>> {
        self.reader.recent_runs(limit).await
    }
}
