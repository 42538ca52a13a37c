//! Broker reconciliation
//!
//! Resolves the free-form brokerage name on each event to a registry broker id,
//! creating registry entries for names seen for the first time.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use ratings_common::types::{Broker, Stock};

use super::storage::BrokerRegistry;
use crate::db::DbError;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Failed to load broker registry: {0}")]
    RegistryLoad(#[source] DbError),
}

/// Counts from one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Records resolved to a broker already in the registry or created earlier this run
    pub matched: usize,
    /// Brokers created this run
    pub created: usize,
    /// Names whose broker could not be persisted
    pub failed: Vec<String>,
    /// Records with a blank brokerage
    pub unassigned: usize,
}

pub struct BrokerReconciler {
    registry: Arc<dyn BrokerRegistry>,
    default_credibility: f64,
}

impl BrokerReconciler {
    pub fn new(registry: Arc<dyn BrokerRegistry>, default_credibility: f64) -> Self {
        Self {
            registry,
            default_credibility,
        }
    }

    /// Fill `broker_id` on every record with a non-blank brokerage.
    ///
    /// Records whose new broker fails to persist keep the in-memory id; the
    /// `stocks.broker_id` foreign key then fails the batch carrying them.
    pub async fn reconcile(&self, records: &mut [Stock]) -> Result<ReconcileReport, ReconcileError> {
        let existing = self
            .registry
            .get_all()
            .await
            .map_err(ReconcileError::RegistryLoad)?;

        let known = existing.len();
        let mut by_name: HashMap<String, Broker> =
            existing.into_iter().map(|b| (b.name.clone(), b)).collect();
        let mut new_brokers = Vec::new();
        let mut report = ReconcileReport::default();

        for record in records.iter_mut() {
            if record.brokerage.trim().is_empty() {
                record.broker_id = None;
                report.unassigned += 1;
                continue;
            }

            if let Some(broker) = by_name.get(&record.brokerage) {
                record.broker_id = Some(broker.id);
                report.matched += 1;
                continue;
            }

            let broker = Broker::new(record.brokerage.clone(), self.default_credibility);
            debug!(name = %broker.name, id = %broker.id, "Discovered new broker");
            record.broker_id = Some(broker.id);
            new_brokers.push(broker.clone());
            by_name.insert(broker.name.clone(), broker);
        }

        for broker in &new_brokers {
            match self.registry.create(broker).await {
                Ok(()) => report.created += 1,
                Err(e) => {
                    warn!(name = %broker.name, error = %e, "Failed to create broker, skipping");
                    report.failed.push(broker.name.clone());
                },
            }
        }

        info!(
            known_brokers = known,
            matched = report.matched,
            created = report.created,
            failed = report.failed.len(),
            unassigned = report.unassigned,
            "Reconciliation finished"
        );

        Ok(report)
    }
}
