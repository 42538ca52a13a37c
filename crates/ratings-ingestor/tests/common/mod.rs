//! Shared fixtures: in-memory storage and feed implementations

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;

use ratings_common::types::{Broker, Stock};
use ratings_ingestor::db::{DbError, DbResult};
use ratings_ingestor::ingest::{
    BrokerRegistry, FetchError, IngestionRun, RunJournal, StockFeed, StockStore,
};
use ratings_ingestor::query::{Page, Pagination, StockFilters, StockStats};

pub fn at(rfc3339: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(rfc3339)
        .unwrap()
        .with_timezone(&Utc)
}

pub fn stock(ticker: &str, brokerage: &str, time: &str) -> Stock {
    Stock::new(ticker, format!("{} Inc.", ticker), brokerage, "target raised by", at(time))
}

/// `count` events for distinct tickers, one minute apart
pub fn stocks(count: usize, brokerage: &str) -> Vec<Stock> {
    let base = at("2024-01-15T10:00:00Z");
    (0..count)
        .map(|i| {
            Stock::new(
                format!("T{:04}", i),
                format!("Company {}", i),
                brokerage,
                "reiterated by",
                base + chrono::Duration::minutes(i as i64),
            )
        })
        .collect()
}

fn unavailable() -> DbError {
    DbError::Sqlx(sqlx::Error::PoolTimedOut)
}

// ============================================================================
// Broker registry
// ============================================================================

#[derive(Default)]
pub struct InMemoryBrokerRegistry {
    brokers: Mutex<Vec<Broker>>,
    fail_names: HashSet<String>,
    fail_load: bool,
    create_calls: AtomicUsize,
}

impl InMemoryBrokerRegistry {
    pub fn with_brokers(names: &[&str]) -> Self {
        let brokers = names.iter().map(|n| Broker::new(*n, 0.8)).collect();
        Self {
            brokers: Mutex::new(brokers),
            ..Default::default()
        }
    }

    pub fn failing_on(mut self, name: &str) -> Self {
        self.fail_names.insert(name.to_string());
        self
    }

    pub fn failing_load(mut self) -> Self {
        self.fail_load = true;
        self
    }

    pub fn brokers(&self) -> Vec<Broker> {
        self.brokers.lock().unwrap().clone()
    }

    pub fn find(&self, name: &str) -> Option<Broker> {
        self.brokers().into_iter().find(|b| b.name == name)
    }

    pub fn contains_id(&self, id: uuid::Uuid) -> bool {
        self.brokers.lock().unwrap().iter().any(|b| b.id == id)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrokerRegistry for InMemoryBrokerRegistry {
    async fn create(&self, broker: &Broker) -> DbResult<()> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_names.contains(&broker.name) {
            return Err(unavailable());
        }

        let mut brokers = self.brokers.lock().unwrap();
        if brokers.iter().any(|b| b.name == broker.name) {
            return Err(DbError::duplicate("Broker", &broker.name));
        }
        brokers.push(broker.clone());
        Ok(())
    }

    async fn get_all(&self) -> DbResult<Vec<Broker>> {
        if self.fail_load {
            return Err(unavailable());
        }
        Ok(self.brokers())
    }

    async fn get_by_name(&self, name: &str) -> DbResult<Option<Broker>> {
        Ok(self.find(name))
    }
}

// ============================================================================
// Stock store
// ============================================================================

#[derive(Default)]
pub struct InMemoryStockStore {
    rows: Mutex<HashMap<(String, DateTime<Utc>), Stock>>,
    batch_sizes: Mutex<Vec<usize>>,
    fail_ticker: Option<String>,
    delay: Duration,
    /// Reject batches referencing brokers missing here, like the foreign key
    registry: Option<Arc<InMemoryBrokerRegistry>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any batch containing `ticker`
    pub fn failing_on(mut self, ticker: &str) -> Self {
        self.fail_ticker = Some(ticker.to_string());
        self
    }

    /// Hold each batch for `delay` before committing
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_registry(mut self, registry: Arc<InMemoryBrokerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn seed(&self, stocks: Vec<Stock>) {
        let mut rows = self.rows.lock().unwrap();
        for stock in stocks {
            rows.insert((stock.ticker.clone(), stock.event_time), stock);
        }
    }

    pub fn rows(&self) -> Vec<Stock> {
        self.rows.lock().unwrap().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn contains(&self, ticker: &str) -> bool {
        self.rows.lock().unwrap().keys().any(|(t, _)| t == ticker)
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn commit(&self, stocks: &[Stock]) -> DbResult<u64> {
        if let Some(ticker) = &self.fail_ticker {
            if stocks.iter().any(|s| &s.ticker == ticker) {
                return Err(unavailable());
            }
        }

        if let Some(registry) = &self.registry {
            let dangling = stocks
                .iter()
                .filter_map(|s| s.broker_id)
                .any(|id| !registry.contains_id(id));
            if dangling {
                return Err(DbError::Corrupt("broker_id violates foreign key".into()));
            }
        }

        let mut rows = self.rows.lock().unwrap();
        let mut inserted = 0;
        for stock in stocks {
            let key = (stock.ticker.clone(), stock.event_time);
            if !rows.contains_key(&key) {
                rows.insert(key, stock.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    fn sorted_newest_first(mut stocks: Vec<Stock>) -> Vec<Stock> {
        stocks.sort_by(|a, b| b.event_time.cmp(&a.event_time).then(a.ticker.cmp(&b.ticker)));
        stocks
    }
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    async fn bulk_upsert(&self, stocks: &[Stock]) -> DbResult<u64> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.batch_sizes.lock().unwrap().push(stocks.len());
        let result = self.commit(stocks);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn list(&self, filters: &StockFilters) -> DbResult<Page<Stock>> {
        let needle = filters.ticker.as_deref().map(str::to_lowercase);
        let matching: Vec<Stock> = self
            .rows()
            .into_iter()
            .filter(|s| match &needle {
                Some(n) => s.ticker.to_lowercase().contains(n),
                None => true,
            })
            .collect();

        let total = matching.len() as i64;
        let items = Self::sorted_newest_first(matching)
            .into_iter()
            .skip(filters.offset() as usize)
            .take(filters.limit() as usize)
            .collect();

        Ok(Page::new(
            items,
            Pagination::new(filters.offset(), filters.limit(), total),
        ))
    }

    async fn by_ticker(&self, ticker: &str) -> DbResult<Vec<Stock>> {
        let matching = self
            .rows()
            .into_iter()
            .filter(|s| s.ticker.eq_ignore_ascii_case(ticker))
            .collect();
        Ok(Self::sorted_newest_first(matching))
    }

    async fn stats(&self, _top_movers: i64) -> DbResult<StockStats> {
        let rows = self.rows();
        let tickers: HashSet<&str> = rows.iter().map(|s| s.ticker.as_str()).collect();
        let brokers: HashSet<uuid::Uuid> = rows.iter().filter_map(|s| s.broker_id).collect();

        Ok(StockStats {
            total_events: rows.len() as i64,
            unique_tickers: tickers.len() as i64,
            broker_count: brokers.len() as i64,
            latest_event_time: rows.iter().map(|s| s.event_time).max(),
            brokerages: Vec::new(),
            top_movers: Vec::new(),
            generated_at: Utc::now(),
        })
    }
}

// ============================================================================
// Run journal
// ============================================================================

#[derive(Default)]
pub struct RecordingJournal {
    started: Mutex<Vec<IngestionRun>>,
    finished: Mutex<Vec<IngestionRun>>,
}

impl RecordingJournal {
    pub fn started(&self) -> Vec<IngestionRun> {
        self.started.lock().unwrap().clone()
    }

    pub fn finished(&self) -> Vec<IngestionRun> {
        self.finished.lock().unwrap().clone()
    }
}

#[async_trait]
impl RunJournal for RecordingJournal {
    async fn record_start(&self, run: &IngestionRun) -> DbResult<()> {
        self.started.lock().unwrap().push(run.clone());
        Ok(())
    }

    async fn record_finish(&self, run: &IngestionRun) -> DbResult<()> {
        self.finished.lock().unwrap().push(run.clone());
        Ok(())
    }

    async fn recent(&self, limit: i64) -> DbResult<Vec<IngestionRun>> {
        Ok(self
            .finished()
            .into_iter()
            .rev()
            .take(limit.max(0) as usize)
            .collect())
    }
}

// ============================================================================
// Feeds
// ============================================================================

/// Returns the same records on every call, optionally after a delay
#[derive(Default)]
pub struct StaticFeed {
    records: Vec<Stock>,
    delay: Duration,
    calls: AtomicUsize,
}

impl StaticFeed {
    pub fn new(records: Vec<Stock>) -> Self {
        Self {
            records,
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StockFeed for StaticFeed {
    async fn fetch_all(&self, cancel: &CancellationToken) -> Result<Vec<Stock>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                _ = tokio::time::sleep(self.delay) => {},
            }
        }
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        Ok(self.records.clone())
    }
}

/// Always fails as if the provider rejected the credentials
pub struct FailingFeed;

#[async_trait]
impl StockFeed for FailingFeed {
    async fn fetch_all(&self, _cancel: &CancellationToken) -> Result<Vec<Stock>, FetchError> {
        Err(FetchError::Status {
            status: StatusCode::UNAUTHORIZED,
            body: "invalid token".to_string(),
        })
    }
}
