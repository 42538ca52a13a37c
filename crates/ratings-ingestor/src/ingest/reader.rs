//! Read-side queries over stored rating events
//!
//! Validates caller input before delegating to storage. Needs no feed
//! credentials, so both the CLI read commands and the orchestrator go
//! through it.

use std::sync::Arc;

use ratings_common::types::Stock;
use ratings_common::RatingsError;

use super::models::IngestionRun;
use super::storage::{RunJournal, StockStore};
use crate::db::DbResult;
use crate::query::{Page, StockFilters, StockStats};

/// Number of target movers included in [`StockReader::stats`]
pub const DEFAULT_TOP_MOVERS: i64 = 10;

#[derive(Clone)]
pub struct StockReader {
    stocks: Arc<dyn StockStore>,
    runs: Option<Arc<dyn RunJournal>>,
}

impl StockReader {
    pub fn new(stocks: Arc<dyn StockStore>) -> Self {
        Self { stocks, runs: None }
    }

    pub fn with_run_journal(mut self, runs: Arc<dyn RunJournal>) -> Self {
        self.runs = Some(runs);
        self
    }

    pub async fn list_stocks(&self, filters: &StockFilters) -> DbResult<Page<Stock>> {
        filters.validate()?;
        self.stocks.list(filters).await
    }

    /// Events for `ticker`, newest first. Blank tickers are rejected.
    pub async fn stocks_by_ticker(&self, ticker: &str) -> DbResult<Vec<Stock>> {
        let ticker = ticker.trim();
        if ticker.is_empty() {
            return Err(RatingsError::validation("ticker", "must not be empty").into());
        }
        self.stocks.by_ticker(ticker).await
    }

    pub async fn stats(&self) -> DbResult<StockStats> {
        self.stocks.stats(DEFAULT_TOP_MOVERS).await
    }

    /// Most recent runs, newest first; empty when no journal is attached.
    pub async fn recent_runs(&self, limit: i64) -> DbResult<Vec<IngestionRun>> {
        match &self.runs {
            Some(runs) => runs.recent(limit).await,
            None => Ok(Vec::new()),
        }
    }
}
