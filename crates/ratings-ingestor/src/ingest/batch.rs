//! Batched, bounded-concurrency persistence
//!
//! Records are split into contiguous batches and each batch is committed by a
//! spawned task through [`StockStore::bulk_upsert`]. At most `worker_count`
//! batches are in flight at once. A failing batch never stops or rolls back
//! its siblings, so a failed run may still have committed batches.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use ratings_common::types::Stock;

use super::storage::StockStore;
use crate::db::DbError;

/// Split `records` into contiguous chunks of at most `size` (minimum 1),
/// preserving order.
pub fn partition<T>(records: Vec<T>, size: usize) -> Vec<Vec<T>> {
    let size = size.max(1);
    let mut batches = Vec::with_capacity(records.len().div_ceil(size));
    let mut iter = records.into_iter().peekable();

    while iter.peek().is_some() {
        batches.push(iter.by_ref().take(size).collect());
    }

    batches
}

/// Aggregate outcome of one `persist_all` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistReport {
    pub batches: usize,
    pub committed_batches: usize,
    pub failed_batches: usize,
    pub skipped_batches: usize,
    pub committed_records: usize,
    pub failed_records: usize,
    pub skipped_records: usize,
    /// Rows actually inserted; duplicates of stored events are not counted
    pub inserted: u64,
}

impl PersistReport {
    /// Records that did not reach storage
    pub fn unpersisted_records(&self) -> usize {
        self.failed_records + self.skipped_records
    }
}

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("batch {} of {total} failed: {source}", .index + 1)]
    Batch {
        index: usize,
        total: usize,
        #[source]
        source: DbError,
        report: PersistReport,
    },

    #[error("batch {} of {total} panicked: {message}", .index + 1)]
    Panicked {
        index: usize,
        total: usize,
        message: String,
        report: PersistReport,
    },

    #[error("persistence cancelled with {skipped} batches not submitted")]
    Cancelled { skipped: usize, report: PersistReport },
}

impl PersistError {
    pub fn report(&self) -> &PersistReport {
        match self {
            PersistError::Batch { report, .. }
            | PersistError::Panicked { report, .. }
            | PersistError::Cancelled { report, .. } => report,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, PersistError::Cancelled { .. })
    }
}

enum BatchOutcome {
    Committed { size: usize, inserted: u64 },
    Failed { index: usize, size: usize, error: DbError },
    Panicked { index: usize, size: usize, message: String },
    Skipped { size: usize },
}

enum FirstFailure {
    Store(usize, DbError),
    Panic(usize, String),
}

pub struct BatchPersister {
    store: Arc<dyn StockStore>,
    batch_size: usize,
    worker_count: usize,
}

impl BatchPersister {
    pub fn new(store: Arc<dyn StockStore>, batch_size: usize, worker_count: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
            worker_count: worker_count.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Commit every batch, returning the first failure in completion order.
    ///
    /// Cancellation is checked as each batch is about to be submitted; batches
    /// already handed to storage run to completion.
    pub async fn persist_all(
        &self,
        records: Vec<Stock>,
        cancel: &CancellationToken,
    ) -> Result<PersistReport, PersistError> {
        let batches = partition(records, self.batch_size);
        let total = batches.len();
        let mut report = PersistReport {
            batches: total,
            ..Default::default()
        };

        if total == 0 {
            return Ok(report);
        }

        info!(
            batches = total,
            batch_size = self.batch_size,
            workers = self.worker_count,
            "Persisting batches"
        );

        let outcomes: Vec<BatchOutcome> = stream::iter(batches.into_iter().enumerate())
            .map(|(index, batch)| {
                let store = Arc::clone(&self.store);
                let cancel = cancel.clone();

                async move {
                    let size = batch.len();
                    if cancel.is_cancelled() {
                        debug!(batch = index + 1, "Skipping batch after cancellation");
                        return BatchOutcome::Skipped { size };
                    }

                    let handle = tokio::spawn(async move { store.bulk_upsert(&batch).await });

                    match handle.await {
                        Ok(Ok(inserted)) => {
                            debug!(batch = index + 1, size, inserted, "Batch committed");
                            BatchOutcome::Committed { size, inserted }
                        },
                        Ok(Err(error)) => {
                            error!(batch = index + 1, size, error = %error, "Batch failed");
                            BatchOutcome::Failed { index, size, error }
                        },
                        Err(join_error) => {
                            error!(batch = index + 1, size, error = %join_error, "Batch task panicked");
                            BatchOutcome::Panicked {
                                index,
                                size,
                                message: join_error.to_string(),
                            }
                        },
                    }
                }
            })
            .buffer_unordered(self.worker_count)
            .collect()
            .await;

        let mut first_failure = None;

        for outcome in outcomes {
            match outcome {
                BatchOutcome::Committed { size, inserted } => {
                    report.committed_batches += 1;
                    report.committed_records += size;
                    report.inserted += inserted;
                },
                BatchOutcome::Failed { index, size, error } => {
                    report.failed_batches += 1;
                    report.failed_records += size;
                    first_failure.get_or_insert(FirstFailure::Store(index, error));
                },
                BatchOutcome::Panicked {
                    index,
                    size,
                    message,
                } => {
                    report.failed_batches += 1;
                    report.failed_records += size;
                    first_failure.get_or_insert(FirstFailure::Panic(index, message));
                },
                BatchOutcome::Skipped { size } => {
                    report.skipped_batches += 1;
                    report.skipped_records += size;
                },
            }
        }

        info!(
            committed = report.committed_batches,
            failed = report.failed_batches,
            skipped = report.skipped_batches,
            inserted = report.inserted,
            "Persistence finished"
        );

        match first_failure {
            Some(FirstFailure::Store(index, source)) => Err(PersistError::Batch {
                index,
                total,
                source,
                report,
            }),
            Some(FirstFailure::Panic(index, message)) => Err(PersistError::Panicked {
                index,
                total,
                message,
                report,
            }),
            None if report.skipped_batches > 0 => {
                warn!(skipped = report.skipped_batches, "Persistence cancelled");
                Err(PersistError::Cancelled {
                    skipped: report.skipped_batches,
                    report,
                })
            },
            None => Ok(report),
        }
    }
}
