//! Storage seams used by the ingestion pipeline
//!
//! The pipeline only talks to these traits. `crate::db` provides the Postgres
//! implementations; tests substitute in-memory ones.

use async_trait::async_trait;

use ratings_common::types::{Broker, Stock};

use super::models::IngestionRun;
use crate::db::DbResult;
use crate::query::{Page, StockFilters, StockStats};

/// Durable broker registry consulted during reconciliation
#[async_trait]
pub trait BrokerRegistry: Send + Sync {
    async fn create(&self, broker: &Broker) -> DbResult<()>;

    async fn get_all(&self) -> DbResult<Vec<Broker>>;

    async fn get_by_name(&self, name: &str) -> DbResult<Option<Broker>>;
}

/// Rating event storage
#[async_trait]
pub trait StockStore: Send + Sync {
    /// Insert `stocks` atomically, ignoring rows whose `(ticker, event_time)`
    /// already exists. Returns the number of rows actually inserted.
    async fn bulk_upsert(&self, stocks: &[Stock]) -> DbResult<u64>;

    async fn list(&self, filters: &StockFilters) -> DbResult<Page<Stock>>;

    /// Events for `ticker` (case-insensitive), newest first
    async fn by_ticker(&self, ticker: &str) -> DbResult<Vec<Stock>>;

    async fn stats(&self, top_movers: i64) -> DbResult<StockStats>;
}

/// History of ingestion runs
#[async_trait]
pub trait RunJournal: Send + Sync {
    async fn record_start(&self, run: &IngestionRun) -> DbResult<()>;

    async fn record_finish(&self, run: &IngestionRun) -> DbResult<()>;

    async fn recent(&self, limit: i64) -> DbResult<Vec<IngestionRun>>;
}
