//! Wire types for the rating feed and bookkeeping types for ingestion runs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use super::batch::PersistReport;
use super::reconciler::ReconcileReport;

/// One page of the provider feed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderPage {
    #[serde(default)]
    pub items: Vec<ProviderItem>,

    /// Cursor for the following page; empty or absent on the last page
    #[serde(default)]
    pub next_page: Option<String>,
}

impl ProviderPage {
    pub fn next_cursor(&self) -> Option<&str> {
        self.next_page
            .as_deref()
            .map(str::trim)
            .filter(|cursor| !cursor.is_empty())
    }
}

/// A raw rating event as the provider sends it.
///
/// Prices are formatted strings such as `"$1,250.75"` and `time` is RFC 3339.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderItem {
    pub ticker: String,
    pub company: String,
    pub brokerage: String,
    pub action: String,
    pub rating_from: String,
    pub rating_to: String,
    pub target_from: String,
    pub target_to: String,
    pub time: String,
}

/// Lifecycle of a single ingestion run
///
/// `Idle -> Fetching -> Reconciling -> Persisting -> Completed`, with a jump to
/// `Failed` from any active phase. A run with nothing to ingest completes
/// straight from `Fetching`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    #[default]
    Idle,
    Fetching,
    Reconciling,
    Persisting,
    Completed,
    Failed,
}

impl RunPhase {
    pub fn can_advance_to(self, next: RunPhase) -> bool {
        use RunPhase::*;
        matches!(
            (self, next),
            (Idle, Fetching)
                | (Fetching, Reconciling)
                | (Fetching, Completed)
                | (Reconciling, Persisting)
                | (Persisting, Completed)
                | (Fetching | Reconciling | Persisting, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Completed | RunPhase::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunPhase::Idle => "idle",
            RunPhase::Fetching => "fetching",
            RunPhase::Reconciling => "reconciling",
            RunPhase::Persisting => "persisting",
            RunPhase::Completed => "completed",
            RunPhase::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted status of an ingestion run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status '{}'", other)),
        }
    }
}

/// Outcome record for one ingestion run, stored in `ingestion_runs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionRun {
    pub id: Uuid,
    /// Correlates log lines of one run
    pub batch_id: String,
    pub total_records: i64,
    pub successful_records: i64,
    pub failed_records: i64,
    pub status: RunStatus,
    pub error_details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub phase: RunPhase,
}

impl IngestionRun {
    pub fn start() -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            batch_id: id.to_string(),
            total_records: 0,
            successful_records: 0,
            failed_records: 0,
            status: RunStatus::Running,
            error_details: None,
            created_at: Utc::now(),
            completed_at: None,
            phase: RunPhase::Idle,
        }
    }

    /// Move to `next`, returning false (and staying put) on an illegal transition.
    pub fn enter(&mut self, next: RunPhase) -> bool {
        if !self.phase.can_advance_to(next) {
            return false;
        }
        self.phase = next;
        true
    }

    pub fn complete(&mut self, successful: i64, failed: i64) {
        self.enter(RunPhase::Completed);
        self.successful_records = successful;
        self.failed_records = failed;
        self.status = RunStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, phase: RunPhase, error: &str, successful: i64, failed: i64) {
        self.enter(RunPhase::Failed);
        self.successful_records = successful;
        self.failed_records = failed;
        self.status = RunStatus::Failed;
        self.error_details = Some(serde_json::json!({
            "phase": phase.as_str(),
            "error": error,
        }));
        self.completed_at = Some(Utc::now());
    }
}

/// What a successful run did
#[derive(Debug, Clone)]
pub struct IngestionSummary {
    pub run: IngestionRun,
    pub fetched: usize,
    pub reconcile: Option<ReconcileReport>,
    pub persist: Option<PersistReport>,
    pub elapsed: Duration,
}
