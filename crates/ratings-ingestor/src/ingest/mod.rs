//! Rating ingestion pipeline
//!
//! # Architecture
//!
//! - **client**: Cursor-paginated feed client with retries and throttling
//! - **parser**: Provider item to [`Stock`](ratings_common::types::Stock) conversion
//! - **reconciler**: Resolves brokerage names to registry broker ids
//! - **batch**: Partitioned, bounded-concurrency bulk persistence
//! - **orchestrator**: Sequences fetch, reconcile and persist for one run
//! - **reader**: Validated read-side queries over stored events
//! - **scheduler**: Startup plus fixed-interval run driver
//! - **storage**: Traits the pipeline persists through
//! - **config** / **models**: Settings and run bookkeeping

pub mod batch;
pub mod client;
pub mod config;
pub mod models;
pub mod orchestrator;
pub mod parser;
pub mod reader;
pub mod reconciler;
pub mod scheduler;
pub mod storage;

pub use batch::{BatchPersister, PersistError, PersistReport};
pub use client::{FetchError, ProviderClient, StockFeed};
pub use config::{IngestConfig, ProviderConfig};
pub use models::{IngestionRun, IngestionSummary, RunPhase, RunStatus};
pub use orchestrator::IngestOrchestrator;
pub use reader::StockReader;
pub use reconciler::{BrokerReconciler, ReconcileError, ReconcileReport};
pub use scheduler::IngestScheduler;
pub use storage::{BrokerRegistry, RunJournal, StockStore};

use thiserror::Error;

/// A failed ingestion run, tagged with the phase that failed
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("fetch phase failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("reconcile phase failed: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("persist phase failed: {0}")]
    Persist(#[from] PersistError),

    #[error("an ingestion run is already in progress")]
    AlreadyRunning,
}

impl IngestError {
    pub fn phase(&self) -> Option<RunPhase> {
        match self {
            IngestError::Fetch(_) => Some(RunPhase::Fetching),
            IngestError::Reconcile(_) => Some(RunPhase::Reconciling),
            IngestError::Persist(_) => Some(RunPhase::Persisting),
            IngestError::AlreadyRunning => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            IngestError::Fetch(e) => e.is_cancelled(),
            IngestError::Persist(e) => e.is_cancelled(),
            _ => false,
        }
    }
}
